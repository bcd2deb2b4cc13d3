//! Configuration loader
//!
//! This module implements the game file loading pipeline:
//! 1. Size limit check
//! 2. Read, strip UTF-8 BOM
//! 3. Environment variable expansion (pre-parse, on raw text)
//! 4. YAML parsing and typed deserialization
//! 5. Command-line overrides
//! 6. Validation
//! 7. Conversion to engine settings, freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{ConfigOverrides, GameConfig};
use crate::config::validation::Validator;
use crate::error::ConfigError;
use crate::game::GameSettings;

/// Source name used for configurations without a file.
pub const INLINE_SOURCE: &str = "<inline>";

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Limits for configuration size.
    pub config_limits: ConfigLimits,

    /// Overrides applied after parsing, before validation.
    pub overrides: ConfigOverrides,
}

/// Limits for configuration size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,

    /// Maximum number of wires in the sequence.
    pub max_wires: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("DEFUSE_MAX_CONFIG_SIZE", 1024 * 1024),
            max_wires: env_or("DEFUSE_MAX_WIRES", 64),
        }
    }
}

/// Result of loading a configuration.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<GameConfig>,

    /// Engine settings derived from `config`.
    pub settings: GameSettings,

    /// Scheduler period derived from `config`.
    pub tick_interval: Duration,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new configuration loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a new configuration loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads a game file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - Environment substitution or YAML parsing fails
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let max = self.options.config_limits.max_config_size;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > max {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {max} bytes"),
            });
        }

        let raw_content = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw_content, path)
    }

    /// Loads a game file from text. `source` names it in errors.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus file access.
    pub fn load_str(&self, raw_content: &str, source: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let raw_content = raw_content.strip_prefix('\u{feff}').unwrap_or(raw_content);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw_content, source)?;
        warnings.extend(env_sub.warnings);

        // An empty file means "all defaults"
        let config: GameConfig = if substituted.trim().is_empty() {
            GameConfig::default()
        } else {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: source.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        let mut result = self.finish(config, &source.display().to_string())?;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Builds the stock configuration with overrides applied.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the overrides are invalid.
    pub fn load_defaults(&self) -> Result<LoadResult, ConfigError> {
        self.finish(GameConfig::default(), INLINE_SOURCE)
    }

    /// Applies overrides, validates and freezes `config`.
    fn finish(&self, mut config: GameConfig, source: &str) -> Result<LoadResult, ConfigError> {
        config.apply_overrides(&self.options.overrides);

        let mut validator = Validator::new();
        let validation = validator.validate(&config, &self.options.config_limits);
        if validation.has_errors() {
            return Err(ConfigError::ValidationError {
                path: source.to_string(),
                errors: validation.errors,
            });
        }

        let (settings, tick_interval) =
            config
                .to_settings()
                .map_err(|(field, message)| ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: message,
                    expected: "a duration such as 90, \"90m\" or \"1h 30m\"".to_string(),
                })?;

        let warnings = validation
            .warnings
            .into_iter()
            .map(|issue| LoadWarning {
                message: issue.message,
                location: Some(issue.path),
            })
            .collect();

        Ok(LoadResult {
            config: Arc::new(config),
            settings,
            tick_interval,
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text BEFORE parsing to preserve type inference.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Substitutes environment variables in raw YAML text.
    ///
    /// Supports:
    /// - `${VAR}` - expand to value (empty string if unset with warning)
    /// - `${VAR:-default}` - expand to default if unset
    /// - `${VAR:?message}` - fail if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = Self::parse_var_spec(&mut chars, source_path)?;
                    match (std::env::var(&spec.name), spec.fallback) {
                        (Ok(value), _) => result.push_str(&value),
                        (Err(_), Fallback::Default(default)) => result.push_str(&default),
                        (Err(_), Fallback::Required(message)) => {
                            return Err(ConfigError::EnvVarNotSet {
                                var: spec.name,
                                location: message,
                            });
                        }
                        (Err(_), Fallback::Empty) => {
                            self.warnings.push(LoadWarning {
                                message: format!(
                                    "Environment variable '{}' is not set, using empty string",
                                    spec.name
                                ),
                                location: Some(source_path.display().to_string()),
                            });
                        }
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    /// Parses a variable specification after `${`.
    fn parse_var_spec(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        source_path: &Path,
    ) -> Result<VarSpec, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Empty,
                    });
                }
                ':' if chars.peek() == Some(&'-') => {
                    chars.next();
                    let default = Self::read_until_close(chars, source_path)?;
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Default(default),
                    });
                }
                ':' if chars.peek() == Some(&'?') => {
                    chars.next();
                    let message = Self::read_until_close(chars, source_path)?;
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Required(message),
                    });
                }
                _ => name.push(c),
            }
        }

        Err(unclosed(source_path, &name))
    }

    /// Reads content until the closing `}`, handling nested braces.
    fn read_until_close(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        source_path: &Path,
    ) -> Result<String, ConfigError> {
        let mut value = String::new();
        let mut depth = 1;

        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
            value.push(c);
        }

        Err(unclosed(source_path, &value))
    }
}

struct VarSpec {
    name: String,
    fallback: Fallback,
}

enum Fallback {
    Empty,
    Default(String),
    Required(String),
}

fn unclosed(source_path: &Path, fragment: &str) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(source_path),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{fragment}"),
    }
}

/// Reads an environment variable and parses it, falling back to `default`.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::schema::DurationValue;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
code: "0042"
countdown: 45m
failure_penalty: 30s
max_attempts: 5
wires:
  sequence: [red, green]
  step_timeout: 8s
tick_interval: 1s
"#,
        );
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.settings.code, "0042");
        assert_eq!(result.settings.countdown_seconds, 2700);
        assert_eq!(result.settings.failure_penalty_seconds, 30);
        assert_eq!(result.settings.max_attempts, 5);
        assert_eq!(result.settings.wire_sequence, vec!["red", "green"]);
        assert_eq!(result.settings.wire_step_seconds, 8);
        assert_eq!(result.tick_interval, Duration::from_secs(1));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.settings, GameSettings::default());
    }

    #[test]
    fn test_bom_is_stripped() {
        let file = write_config("\u{feff}max_attempts: 3\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.settings.max_attempts, 3);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::with_defaults()
            .load(Path::new("/definitely/not/here.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_size_limit() {
        let file = write_config("code: \"1234\"\n");
        let loader = ConfigLoader::new(LoaderOptions {
            config_limits: ConfigLimits {
                max_config_size: 4,
                ..ConfigLimits::default()
            },
            ..LoaderOptions::default()
        });
        let err = loader.load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "file_size"));
    }

    #[test]
    fn test_parse_error_has_line() {
        let file = write_config("code: \"1\"\nwires: [unclosed\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        match err {
            ConfigError::ParseError { line, .. } => assert!(line.is_some()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_error() {
        let file = write_config("max_attempts: 0\ncode: \"\"\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_warnings_are_returned() {
        let file = write_config("wires:\n  sequence: [red, blue, red]\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(
            result.warnings[0].location.as_deref(),
            Some("wires.sequence[2]")
        );
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = write_config("code: \"1111\"\nmax_attempts: 9\n");
        let loader = ConfigLoader::new(LoaderOptions {
            overrides: ConfigOverrides {
                code: Some("2222".to_string()),
                countdown: Some(DurationValue::Text("5m".to_string())),
                max_attempts: None,
            },
            ..LoaderOptions::default()
        });
        let result = loader.load(file.path()).unwrap();
        assert_eq!(result.settings.code, "2222");
        assert_eq!(result.settings.countdown_seconds, 300);
        assert_eq!(result.settings.max_attempts, 9);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let loader = ConfigLoader::new(LoaderOptions {
            overrides: ConfigOverrides {
                max_attempts: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoaderOptions::default()
        });
        let err = loader.load_defaults().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { path, .. } if path == INLINE_SOURCE)
        );
    }

    #[test]
    fn test_env_substitution_default() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute(
                "code: ${DEFUSE_TEST_NONEXISTENT_VAR_XYZ123:-9999}",
                Path::new("game.yaml"),
            )
            .unwrap();
        assert_eq!(result, "code: 9999");
    }

    #[test]
    fn test_env_substitution_simple() {
        // PATH is always set
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("path: ${PATH}", Path::new("game.yaml"))
            .unwrap();
        assert!(!result.contains("${PATH}"));
        assert!(result.len() > "path: ".len());
    }

    #[test]
    fn test_env_substitution_required_missing() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute(
            "code: ${DEFUSE_TEST_REQUIRED_XYZ123:?set the bomb code}",
            Path::new("game.yaml"),
        );
        match result {
            Err(ConfigError::EnvVarNotSet { var, location }) => {
                assert_eq!(var, "DEFUSE_TEST_REQUIRED_XYZ123");
                assert_eq!(location, "set the bomb code");
            }
            _ => panic!("Expected EnvVarNotSet error"),
        }
    }

    #[test]
    fn test_env_substitution_missing_warning() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("code: ${DEFUSE_TEST_WARN_XYZ123}", Path::new("game.yaml"))
            .unwrap();
        assert_eq!(result, "code: ");
        assert_eq!(sub.warnings.len(), 1);
        assert!(sub.warnings[0].message.contains("DEFUSE_TEST_WARN_XYZ123"));
    }

    #[test]
    fn test_env_substitution_escaped_dollar() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("code: $$100", Path::new("game.yaml"))
            .unwrap();
        assert_eq!(result, "code: $100");
    }

    #[test]
    fn test_env_substitution_unclosed() {
        let mut sub = EnvSubstitution::new();
        let err = sub
            .substitute("code: ${OOPS", Path::new("game.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
