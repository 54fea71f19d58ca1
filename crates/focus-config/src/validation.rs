//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::DEFAULT_FOCUS_SECS;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("Breathing delay {delay_ms}ms must be shorter than the focus default {focus_secs}s")]
    BreatheExceedsFocus { delay_ms: u64, focus_secs: u64 },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let positive = [
        ("timing.tick_interval_ms", config.timing.tick_interval_ms),
        (
            "timing.fallback_duration_secs",
            config.timing.fallback_duration_secs,
        ),
        ("defaults.focus_secs", config.defaults.focus_secs),
        ("defaults.rest_secs", config.defaults.rest_secs),
    ];

    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::MustBePositive { field });
        }
    }

    // A zero breathing delay is allowed; it just skips straight to the session.
    // The delay is checked against the focus length actually in effect.
    let focus_secs = config.defaults.focus_secs.unwrap_or(DEFAULT_FOCUS_SECS);
    if let Some(delay_ms) = config.timing.breathe_delay_ms
        && focus_secs > 0
        && delay_ms >= focus_secs.saturating_mul(1000)
    {
        errors.push(ValidationError::BreatheExceedsFocus {
            delay_ms,
            focus_secs,
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawDefaults, RawTiming};

    fn config(timing: RawTiming, defaults: RawDefaults) -> RawConfig {
        RawConfig {
            config_version: 1,
            timing,
            defaults,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let errors = validate_config(&config(RawTiming::default(), RawDefaults::default()));
        assert!(errors.is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let errors = validate_config(&config(
            RawTiming {
                tick_interval_ms: Some(0),
                breathe_delay_ms: Some(0),
                fallback_duration_secs: None,
            },
            RawDefaults {
                focus_secs: None,
                rest_secs: Some(0),
            },
        ));

        assert_eq!(
            errors,
            vec![
                ValidationError::MustBePositive {
                    field: "timing.tick_interval_ms"
                },
                ValidationError::MustBePositive {
                    field: "defaults.rest_secs"
                },
            ]
        );
    }

    #[test]
    fn breathe_longer_than_focus_rejected() {
        let errors = validate_config(&config(
            RawTiming {
                breathe_delay_ms: Some(60_000),
                ..Default::default()
            },
            RawDefaults {
                focus_secs: Some(60),
                rest_secs: None,
            },
        ));

        assert!(matches!(
            errors.as_slice(),
            [ValidationError::BreatheExceedsFocus { .. }]
        ));
    }

    #[test]
    fn breathe_checked_against_default_focus() {
        let errors = validate_config(&config(
            RawTiming {
                breathe_delay_ms: Some(u64::MAX),
                ..Default::default()
            },
            RawDefaults::default(),
        ));

        assert_eq!(
            errors,
            vec![ValidationError::BreatheExceedsFocus {
                delay_ms: u64::MAX,
                focus_secs: DEFAULT_FOCUS_SECS,
            }]
        );
    }
}
