//! Error types for `defuse`
//!
//! One enum per concern, aggregated into [`DefuseError`] for the CLI,
//! which maps each variant onto a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::game::BombStatus;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `defuse` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Transport error (bind failed, server crashed)
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Game engine error
    pub const ENGINE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `defuse` operations.
///
/// Aggregates the domain errors and provides exit code mapping.
#[derive(Debug, Error)]
pub enum DefuseError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport layer error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Game engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DefuseError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Transport(_) => ExitCode::TRANSPORT_ERROR,
            Self::Engine(_) => ExitCode::ENGINE_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Engine Errors
// ============================================================================

/// Errors reported by game engine operations.
///
/// None of these are fatal: the engine state is untouched when one is
/// returned, and the caller can render `message` directly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Operation attempted while the game is not in the required status
    #[error("{message} (status: {status})")]
    InvalidState {
        /// Status at the time of the call
        status: BombStatus,
        /// Human-readable reason
        message: String,
    },
}

impl EngineError {
    /// Builds an [`EngineError::InvalidState`].
    #[must_use]
    pub fn invalid_state(status: BombStatus, message: impl Into<String>) -> Self {
        Self::InvalidState {
            status,
            message: message.into(),
        }
    }

    /// Returns the human-readable reason without the status suffix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidState { message, .. } => message,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", format_issues(errors))]
    ValidationError {
        /// Path to the configuration file (or `"<inline>"`)
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "wires.sequence[2]")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported, but the configuration still loads
    Warning,
}

// ============================================================================
// Transport Errors
// ============================================================================

/// HTTP transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during transport operations
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to bind or serve
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `defuse` operations.
pub type Result<T> = std::result::Result<T, DefuseError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::TRANSPORT_ERROR, 4);
        assert_eq!(ExitCode::ENGINE_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_exit_code_mapping() {
        let cases: Vec<(DefuseError, i32)> = vec![
            (
                ConfigError::MissingFile {
                    path: PathBuf::from("/x"),
                }
                .into(),
                ExitCode::CONFIG_ERROR,
            ),
            (
                TransportError::ConnectionFailed("x".into()).into(),
                ExitCode::TRANSPORT_ERROR,
            ),
            (
                EngineError::invalid_state(BombStatus::Exploded, "x").into(),
                ExitCode::ENGINE_ERROR,
            ),
            (DefuseError::Usage("x".into()), ExitCode::USAGE_ERROR),
            (
                std::io::Error::new(std::io::ErrorKind::NotFound, "x").into(),
                ExitCode::IO_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.exit_code(), expected, "Wrong exit code for {err}");
        }
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EngineError::invalid_state(BombStatus::Disarmed, "not activatable now");
        assert_eq!(err.to_string(), "not activatable now (status: Disarmed)");
        assert_eq!(err.message(), "not activatable now");
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "wires.sequence[1]".to_string(),
            message: "wire id is blank".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: wire id is blank at wires.sequence[1]"
        );
    }

    #[test]
    fn test_validation_error_lists_issues() {
        let err = ConfigError::ValidationError {
            path: "game.yaml".to_string(),
            errors: vec![ValidationIssue {
                path: "code".to_string(),
                message: "code must not be empty".to_string(),
                severity: Severity::Error,
            }],
        };
        let text = err.to_string();
        assert!(text.contains("game.yaml"));
        assert!(text.contains("code must not be empty"));
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "BOMB_CODE".to_string(),
            location: "line 1".to_string(),
        };
        assert!(err.to_string().contains("BOMB_CODE"));
        assert!(err.to_string().contains("line 1"));
    }
}
