//! # Configuration Validation

use crate::config::CaptureConfig;
use validator::Validate;

/// Validate a configuration.
///
/// ## Validation Rules
/// ### Window
/// - `ring_capacity`: 1-100000
/// - `pre_roll_ms`: at most 10000
///
/// ### Bot
/// - `min_delay_ms`, `max_delay_ms`: at least 1, and `min_delay_ms <= max_delay_ms`
/// - `hold_ms`: at most 10000
/// - `vertical_fraction`: 0.01-1.0
///
/// ### Sensors
/// - periods: 100-1000000 microseconds
/// - `period_jitter`: 0.0-0.9
///
/// ### Observability
/// - `logging_level`: must be "trace", "debug", "info", "warn", or "error"
pub fn validate(config: &CaptureConfig) -> Result<(), validator::ValidationErrors> {
    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate(&CaptureConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_reports_nested_field() {
        let mut config = CaptureConfig::default();
        config.sensors.period_jitter = 1.5;

        let errors = validate(&config).unwrap_err();
        assert!(errors.errors().contains_key("sensors"));
    }
}
