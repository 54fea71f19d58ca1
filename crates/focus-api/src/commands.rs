//! Command types accepted by the session orchestrator

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Where the orchestrator should go once a deferred unpause is reported back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextTarget {
    /// Commit the focus period and return to idle
    Idle,
    /// Commit the focus period and start a break of the given length
    Rest { duration_secs: u64 },
}

/// Fields merged directly into the session context.
///
/// Absent fields leave the context untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_pause_marker: Option<DateTime<Local>>,
}

impl ContextPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn pause_marker(at: DateTime<Local>) -> Self {
        Self {
            pending_pause_marker: Some(at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.pending_pause_marker.is_none()
    }
}

/// All commands a presentation layer may send.
///
/// Durations are optional on the wire; the service fills in configured
/// defaults before they reach the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a focus period (after the breathing delay)
    InitFocus {
        #[serde(default)]
        duration_secs: Option<u64>,
    },

    /// Start or switch to a rest period
    TakeABreak {
        #[serde(default)]
        duration_secs: Option<u64>,
    },

    /// Finish the current period and go idle
    StopWorking,

    /// Mark the task done once the focus timer has run out
    CompleteTask,

    Pause,

    Unpause,

    /// Add seconds to the live timer's target
    Increment { seconds: u64 },

    /// Remove seconds from the live timer's target
    Decrement { seconds: u64 },

    /// Drop whatever is in progress without committing it
    AbandonSession,

    /// Merge fields into the session context
    OverrideState { patch: ContextPatch },

    /// Request a snapshot
    GetState,
}
