//! Frame clock
//!
//! The simulation is stepped by an integer frame counter instead of wall time.
//! Every stage owns its own clock so independent stages never share a counter.

use serde::{Deserialize, Serialize};

/// Frame number.
pub type Frame = u64;

/// Monotonic frame counter owned by a stage context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameClock {
    frame: Frame,
}

impl FrameClock {
    /// Create a clock at frame zero.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame number.
    #[inline]
    pub fn current(&self) -> Frame {
        self.frame
    }

    /// Advance by exactly one frame and return the new frame number.
    #[inline]
    pub fn tick(&mut self) -> Frame {
        self.frame += 1;
        self.frame
    }

    /// Frames elapsed since `start`.
    ///
    /// Returns zero for a `start` in the future.
    #[inline]
    pub fn elapsed_since(
        &self,
        start: Frame,
    ) -> Frame {
        self.frame.saturating_sub(start)
    }

    /// Reset to frame zero. Only stage (re)initialization does this.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.frame = 0;
    }
}

impl std::fmt::Display for FrameClock {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "frame {}", self.frame)
    }
}
