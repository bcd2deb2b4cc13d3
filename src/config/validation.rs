//! Game configuration validation
//!
//! Runs on the fully deserialized [`GameConfig`] after command-line
//! overrides are applied. Validation collects every issue instead of
//! stopping at the first, so a game master fixing a file sees all
//! problems at once.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::loader::ConfigLimits;
use crate::config::schema::{DurationValue, GameConfig};
use crate::error::{Severity, ValidationIssue};

/// Shortest accepted tick interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &GameConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_code(config);
        self.validate_timing(config);
        self.validate_wires(config, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Rules
    // ========================================================================

    fn validate_code(&mut self, config: &GameConfig) {
        if config.code.is_empty() {
            self.add_error("code", "code must not be empty");
        } else if config.code.trim() != config.code {
            self.add_warning(
                "code",
                "code has surrounding whitespace; submissions are compared exactly",
            );
        }

        if config.max_attempts == 0 {
            self.add_error("max_attempts", "max_attempts must be at least 1");
        }
    }

    fn validate_timing(&mut self, config: &GameConfig) {
        let countdown = self.duration("countdown", &config.countdown);
        if countdown.is_some_and(|d| d.as_secs() == 0) {
            self.add_error("countdown", "countdown must be at least one second");
        }

        let penalty = self.duration("failure_penalty", &config.failure_penalty);
        if let (Some(countdown), Some(penalty)) = (countdown, penalty) {
            if countdown.as_secs() > 0 && penalty.as_secs() >= countdown.as_secs() {
                self.add_warning(
                    "failure_penalty",
                    "a single failed attempt consumes the whole countdown",
                );
            }
        }

        if let Some(tick) = self.duration("tick_interval", &config.tick_interval) {
            if tick < MIN_TICK_INTERVAL {
                self.add_error("tick_interval", "tick_interval must be at least 10ms");
            } else if tick != Duration::from_secs(1) {
                self.add_warning(
                    "tick_interval",
                    "each tick still counts as one second of countdown",
                );
            }
        }
    }

    fn validate_wires(&mut self, config: &GameConfig, limits: &ConfigLimits) {
        let sequence = &config.wires.sequence;

        if sequence.len() > limits.max_wires {
            self.add_error(
                "wires.sequence",
                &format!(
                    "wire sequence has {} entries, at most {} allowed",
                    sequence.len(),
                    limits.max_wires
                ),
            );
        }

        let step = self.duration("wires.step_timeout", &config.wires.step_timeout);
        if !sequence.is_empty() && step.is_some_and(|d| d.as_secs() == 0) {
            self.add_error(
                "wires.step_timeout",
                "step_timeout must be at least one second",
            );
        }

        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for (i, id) in sequence.iter().enumerate() {
            let path = format!("wires.sequence[{i}]");
            if id.trim().is_empty() {
                self.add_error(&path, "wire id must not be blank");
                continue;
            }

            let key = id.to_lowercase();
            if i > 0 && sequence[i - 1].to_lowercase() == key {
                self.add_warning(&path, &format!("wire '{id}' repeats the previous wire"));
            } else if let Some(first) = first_seen.get(&key) {
                self.add_warning(
                    &path,
                    &format!("wire '{id}' already appears at position {first}"),
                );
            }
            first_seen.entry(key).or_insert(i);
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Parses a duration field, recording an error when it is invalid.
    fn duration(&mut self, path: &str, value: &DurationValue) -> Option<Duration> {
        match value.to_duration() {
            Ok(d) => {
                if d.subsec_nanos() != 0 && path != "tick_interval" {
                    self.add_warning(path, "fractional seconds are truncated");
                }
                Some(d)
            }
            Err(e) => {
                self.add_error(path, &format!("invalid duration '{value}': {e}"));
                None
            }
        }
    }

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(config: &GameConfig) -> ValidationResult {
        Validator::new().validate(config, &ConfigLimits::default())
    }

    fn config_with_wires(wires: &[&str]) -> GameConfig {
        let mut config = GameConfig::default();
        config.wires.sequence = wires.iter().map(|w| (*w).to_string()).collect();
        config
    }

    fn error_paths(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        let result = validate(&GameConfig::default());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_code() {
        let config = GameConfig {
            code: String::new(),
            ..GameConfig::default()
        };
        assert_eq!(error_paths(&validate(&config)), vec!["code"]);
    }

    #[test]
    fn test_zero_max_attempts() {
        let config = GameConfig {
            max_attempts: 0,
            ..GameConfig::default()
        };
        assert_eq!(error_paths(&validate(&config)), vec!["max_attempts"]);
    }

    #[test]
    fn test_zero_countdown() {
        let config = GameConfig {
            countdown: DurationValue::Seconds(0),
            ..GameConfig::default()
        };
        assert_eq!(error_paths(&validate(&config)), vec!["countdown"]);
    }

    #[test]
    fn test_invalid_duration_text() {
        let config = GameConfig {
            countdown: DurationValue::Text("forever".to_string()),
            ..GameConfig::default()
        };
        let result = validate(&config);
        assert_eq!(error_paths(&result), vec!["countdown"]);
        assert!(result.errors[0].message.contains("forever"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = config_with_wires(&["red", " "]);
        config.code = String::new();
        config.max_attempts = 0;
        config.tick_interval = DurationValue::Text("1ms".to_string());
        let result = validate(&config);
        assert_eq!(result.errors.len(), 4);
    }

    #[test]
    fn test_blank_wire() {
        let result = validate(&config_with_wires(&["red", ""]));
        assert_eq!(error_paths(&result), vec!["wires.sequence[1]"]);
    }

    #[test]
    fn test_adjacent_duplicate_wire_is_warning() {
        let result = validate(&config_with_wires(&["red", "RED", "blue"]));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "wires.sequence[1]");
        assert!(result.warnings[0].message.contains("previous wire"));
    }

    #[test]
    fn test_repeated_wire_is_warning() {
        let result = validate(&config_with_wires(&["red", "blue", "Red"]));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "wires.sequence[2]");
        assert!(result.warnings[0].message.contains("position 0"));
    }

    #[test]
    fn test_zero_step_timeout() {
        let mut config = config_with_wires(&["red"]);
        config.wires.step_timeout = DurationValue::Seconds(0);
        assert_eq!(error_paths(&validate(&config)), vec!["wires.step_timeout"]);

        let mut empty = config_with_wires(&[]);
        empty.wires.step_timeout = DurationValue::Seconds(0);
        assert!(validate(&empty).is_valid());
    }

    #[test]
    fn test_too_many_wires() {
        let wires: Vec<String> = (0..5).map(|i| format!("w{i}")).collect();
        let mut config = GameConfig::default();
        config.wires.sequence = wires;
        let limits = ConfigLimits {
            max_wires: 4,
            ..ConfigLimits::default()
        };
        let result = Validator::new().validate(&config, &limits);
        assert_eq!(error_paths(&result), vec!["wires.sequence"]);
    }

    #[test]
    fn test_penalty_covering_countdown_warns() {
        let config = GameConfig {
            countdown: DurationValue::Seconds(30),
            failure_penalty: DurationValue::Seconds(30),
            ..GameConfig::default()
        };
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings[0].path, "failure_penalty");
    }

    #[test]
    fn test_fast_tick_warns() {
        let config = GameConfig {
            tick_interval: DurationValue::Text("100ms".to_string()),
            ..GameConfig::default()
        };
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "tick_interval");
    }

    #[test]
    fn test_fractional_seconds_warn() {
        let config = GameConfig {
            countdown: DurationValue::Text("90s 500ms".to_string()),
            ..GameConfig::default()
        };
        let result = validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings[0].message, "fractional seconds are truncated");
    }
}
