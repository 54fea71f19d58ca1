//! Shared utilities for focusd
//!
//! This crate provides:
//! - ID types (TimerId)
//! - Clocks (system clock with mock-time support, manual clock for tests)
//! - Error types
//! - Default paths for config and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
