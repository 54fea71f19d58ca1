//! Event types for service -> subscriber streaming

use chrono::{DateTime, Local};
use focus_util::TimerId;
use serde::{Deserialize, Serialize};

use crate::{PauseInterval, PeriodRecord, SessionPhase, SessionSnapshot, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self::at(focus_util::now(), payload)
    }

    pub fn at(timestamp: DateTime<Local>, payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp,
            payload,
        }
    }
}

/// All possible events from the service to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on request)
    State(SessionSnapshot),

    /// The orchestrator moved between states
    StateChanged {
        from: SessionPhase,
        to: SessionPhase,
    },

    /// A period was appended to the history
    PeriodCommitted(PeriodRecord),

    /// A pause interval was accumulated for the active period
    PauseRecorded(PauseInterval),

    TimerSpawned {
        timer_id: TimerId,
        duration_secs: u64,
    },

    TimerDisposed {
        timer_id: TimerId,
    },

    /// The live timer went past its target
    TimerEnded {
        timer_id: TimerId,
    },

    /// The live timer's target moved back ahead of elapsed time
    OverflowReversed {
        timer_id: TimerId,
    },

    /// A command could not be understood
    Error {
        message: String,
    },

    /// Service is shutting down
    Shutdown,
}
