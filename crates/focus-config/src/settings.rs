//! Validated settings

use crate::schema::{RawConfig, RawDefaults, RawTiming};
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_BREATHE_DELAY_MS: u64 = 1000;
pub const DEFAULT_FALLBACK_DURATION_SECS: u64 = 999;
pub const DEFAULT_FOCUS_SECS: u64 = 25 * 60;
pub const DEFAULT_REST_SECS: u64 = 5 * 60;

/// Validated settings ready for use by the session runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub timing: Timing,
    pub defaults: Defaults,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            timing: Timing::from_raw(raw.timing),
            defaults: Defaults::from_raw(raw.defaults),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    pub tick_interval: Duration,
    pub breathe_delay: Duration,
    pub fallback_duration_secs: u64,
}

impl Timing {
    fn from_raw(raw: RawTiming) -> Self {
        Self {
            tick_interval: Duration::from_millis(
                raw.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
            breathe_delay: Duration::from_millis(
                raw.breathe_delay_ms.unwrap_or(DEFAULT_BREATHE_DELAY_MS),
            ),
            fallback_duration_secs: raw
                .fallback_duration_secs
                .unwrap_or(DEFAULT_FALLBACK_DURATION_SECS),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_raw(RawTiming::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub focus_secs: u64,
    pub rest_secs: u64,
}

impl Defaults {
    fn from_raw(raw: RawDefaults) -> Self {
        Self {
            focus_secs: raw.focus_secs.unwrap_or(DEFAULT_FOCUS_SECS),
            rest_secs: raw.rest_secs.unwrap_or(DEFAULT_REST_SECS),
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::from_raw(RawDefaults::default())
    }
}
