//! Messages exchanged between the orchestrator and its timer

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{ContextPatch, NextTarget, PauseInterval};

/// Partial timer fields carried by [`TimerCommand::OverrideState`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_buffer_secs: Option<f64>,
}

/// Commands addressed to a timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerCommand {
    Start { duration_secs: u64 },

    /// Periodic recompute, normally raised by the timer's own clock
    Tick,

    Pause,

    /// `next_target` is opaque to the timer and echoed back in
    /// [`TimerNotice::RecordPause`]
    Unpause {
        #[serde(default)]
        next_target: Option<NextTarget>,
    },

    Increment { seconds: u64 },

    Decrement { seconds: u64 },

    Stop,

    /// Accepted and ignored
    OverrideState { patch: TimerPatch },
}

/// Notifications a timer sends to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerNotice {
    /// Elapsed time went past the target
    TimerEnded,

    /// The target moved back ahead of elapsed time
    OverflowReversed,

    /// Fields for the owner to merge into its own context
    OverrideState { patch: ContextPatch },

    /// A pause finished; the owner records it
    RecordPause {
        start: DateTime<Local>,
        end: DateTime<Local>,
        #[serde(default)]
        next_target: Option<NextTarget>,
    },
}

impl TimerNotice {
    pub fn record_pause(
        start: DateTime<Local>,
        end: DateTime<Local>,
        next_target: Option<NextTarget>,
    ) -> Self {
        let interval = PauseInterval::new(start, end);
        Self::RecordPause {
            start: interval.start,
            end: interval.end,
            next_target,
        }
    }
}
