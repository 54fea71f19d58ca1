//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Timer and orchestrator timing
    #[serde(default)]
    pub timing: RawTiming,

    /// Durations used when a command omits one
    #[serde(default)]
    pub defaults: RawDefaults,
}

/// Timing settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTiming {
    /// Period of the timer's recompute tick
    pub tick_interval_ms: Option<u64>,

    /// Delay spent in the breathing state before a focus period starts
    pub breathe_delay_ms: Option<u64>,

    /// Duration given to a timer spawned without an explicit one
    pub fallback_duration_secs: Option<u64>,
}

/// Default durations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    pub focus_secs: Option<u64>,
    pub rest_secs: Option<u64>,
}
