//! Runtime system
//!
//! This module contains the frame clock and the cooperative task scheduler.

pub mod clock;
pub mod scheduler;
