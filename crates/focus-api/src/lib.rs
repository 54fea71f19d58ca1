//! Protocol types for focusd
//!
//! This crate defines the stable vocabulary between the session core and
//! whatever presents it:
//! - Commands (presentation -> session orchestrator)
//! - Timer messages (orchestrator <-> timer)
//! - Snapshots and period records
//! - Events (service -> subscribers)

mod commands;
mod events;
mod timer;
mod types;

pub use commands::*;
pub use events::*;
pub use timer::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
