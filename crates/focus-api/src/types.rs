//! Shared types for the focusd API

use chrono::{DateTime, Local};
use focus_util::{TimerId, seconds_between};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a committed period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Focus,
    Rest,
}

/// A closed pause, both ends absolute instants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl PauseInterval {
    /// Build an interval, clamping `end` so it never precedes `start`
    pub fn new(start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        seconds_between(self.start, self.end)
    }
}

/// An immutable entry in the session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub kind: PeriodKind,
    pub title: String,
    pub note: String,
    pub project_id: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub pauses: Vec<PauseInterval>,
}

impl PeriodRecord {
    /// Wall-clock length of the period, pauses included
    pub fn duration_secs(&self) -> f64 {
        seconds_between(self.start, self.end)
    }

    /// Total seconds spent paused inside the period
    pub fn paused_secs(&self) -> f64 {
        self.pauses.iter().map(PauseInterval::duration_secs).sum()
    }
}

/// Timer machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Running,
    Overflowed,
    Paused,
    /// Declared but never entered by any transition
    Rest,
}

impl TimerPhase {
    pub const ALL: [TimerPhase; 5] = [
        TimerPhase::Idle,
        TimerPhase::Running,
        TimerPhase::Overflowed,
        TimerPhase::Paused,
        TimerPhase::Rest,
    ];
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Overflowed => "overflowed",
            TimerPhase::Paused => "paused",
            TimerPhase::Rest => "rest",
        };
        f.write_str(name)
    }
}

/// Session orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Breathe,
    Session,
    SessionPaused,
    SessionEnd,
    Rest,
    RestEnd,
}

impl SessionPhase {
    pub const ALL: [SessionPhase; 7] = [
        SessionPhase::Idle,
        SessionPhase::Breathe,
        SessionPhase::Session,
        SessionPhase::SessionPaused,
        SessionPhase::SessionEnd,
        SessionPhase::Rest,
        SessionPhase::RestEnd,
    ];
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Breathe => "breathe",
            SessionPhase::Session => "session",
            SessionPhase::SessionPaused => "session_paused",
            SessionPhase::SessionEnd => "session_end",
            SessionPhase::Rest => "rest",
            SessionPhase::RestEnd => "rest_end",
        };
        f.write_str(name)
    }
}

/// Read-only view of a live timer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub timer_id: TimerId,
    pub state: TimerPhase,
    pub start_date: DateTime<Local>,
    pub target_duration_secs: u64,
    /// May be negative once the timer has overflowed
    pub seconds_remaining: i64,
    /// Seconds counted against the target (pauses excluded)
    pub elapsed_secs: f64,
    pub pause_buffer_secs: f64,
    pub pause_started_at: Option<DateTime<Local>>,
}

/// Full read-only state of a session orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub api_version: u32,
    pub state: SessionPhase,
    pub active_timer: Option<TimerId>,
    pub history: Vec<PeriodRecord>,
    pub current_period_start: DateTime<Local>,
    pub pending_pause_marker: Option<DateTime<Local>>,
    pub accumulated_pauses: Vec<PauseInterval>,
    pub title: String,
    /// Present while a timer is live
    pub timer: Option<TimerSnapshot>,
}
