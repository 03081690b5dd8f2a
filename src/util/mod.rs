//! Utility modules

pub mod config;
pub mod logger;

#[cfg(test)]
mod tests;
