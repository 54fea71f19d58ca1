//! Timer and session state machines for focusd
//!
//! This crate is the heart of focusd, containing:
//! - A declarative transition-table engine with a global handler tier
//! - The timer machine (Idle -> Running -> Overflowed, with Paused)
//! - The session orchestrator (Idle -> Breathe -> Session -> SessionEnd -> Rest -> RestEnd)
//! - A deterministic in-process runtime for tests and scripted replays
//! - The tokio runtime: one task per timer plus the session service

mod actor;
mod chart;
mod local;
mod service;
mod session;
mod timer;

pub use actor::*;
pub use chart::*;
pub use local::*;
pub use service::*;
pub use session::*;
pub use timer::*;
