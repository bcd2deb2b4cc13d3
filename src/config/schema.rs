//! Game configuration schema
//!
//! Types deserialized from a YAML game file. Every field is optional and
//! falls back to the stock escape-room round:
//!
//! ```yaml
//! code: "1234"
//! countdown: 90m
//! failure_penalty: 60s
//! max_attempts: 20
//! wires:
//!   sequence: [red, blue, green, yellow, white, black]
//!   step_timeout: 10s
//! tick_interval: 1s
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::game::GameSettings;

// ============================================================================
// Durations
// ============================================================================

/// A duration written either as whole seconds (`90`) or as a
/// `humantime` string (`"1h 30m"`, `"45s"`, `"250ms"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    /// Whole seconds.
    Seconds(u64),
    /// Human-readable duration.
    Text(String),
}

impl DurationValue {
    /// Parses into a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns the parser message when the text is not a valid duration.
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            Self::Text(text) => {
                humantime::parse_duration(text.trim()).map_err(|e| e.to_string())
            }
        }
    }
}

impl FromStr for DurationValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.trim()
            .parse::<u64>()
            .map_or_else(|_| Self::Text(s.to_string()), Self::Seconds))
    }
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(secs) => write!(f, "{secs}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root of a game file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Secret disarm code. Unquoted numbers are accepted; quote codes
    /// with leading zeros.
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,

    /// Initial countdown of every round.
    pub countdown: DurationValue,

    /// Time removed per failed attempt.
    pub failure_penalty: DurationValue,

    /// Failed attempts that explode the bomb.
    pub max_attempts: u32,

    /// Wire activation puzzle.
    pub wires: WireConfig,

    /// Scheduler period. One tick removes one second from the countdown.
    pub tick_interval: DurationValue,
}

impl Default for GameConfig {
    fn default() -> Self {
        let stock = GameSettings::default();
        Self {
            code: stock.code,
            countdown: DurationValue::Seconds(stock.countdown_seconds),
            failure_penalty: DurationValue::Seconds(stock.failure_penalty_seconds),
            max_attempts: stock.max_attempts,
            wires: WireConfig {
                sequence: stock.wire_sequence,
                step_timeout: DurationValue::Seconds(stock.wire_step_seconds),
            },
            tick_interval: DurationValue::Seconds(1),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    })
}

/// Wire puzzle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WireConfig {
    /// Wire identifiers in the order they must be pressed.
    pub sequence: Vec<String>,

    /// Time allowed between two correct presses.
    pub step_timeout: DurationValue,
}

impl Default for WireConfig {
    fn default() -> Self {
        GameConfig::default().wires
    }
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replaces `code`.
    pub code: Option<String>,
    /// Replaces `countdown`.
    pub countdown: Option<DurationValue>,
    /// Replaces `max_attempts`.
    pub max_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Whether no override is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.code.is_none() && self.countdown.is_none() && self.max_attempts.is_none()
    }
}

impl GameConfig {
    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(code) = &overrides.code {
            code.clone_into(&mut self.code);
        }
        if let Some(countdown) = &overrides.countdown {
            self.countdown = countdown.clone();
        }
        if let Some(max) = overrides.max_attempts {
            self.max_attempts = max;
        }
    }

    /// Converts into engine settings and the tick period.
    ///
    /// Sub-second parts of countdown, penalty and step timeout are
    /// truncated.
    ///
    /// # Errors
    ///
    /// Returns `(field, message)` for the first duration that does not
    /// parse. Validated configs always convert.
    pub fn to_settings(&self) -> Result<(GameSettings, Duration), (&'static str, String)> {
        let countdown = self
            .countdown
            .to_duration()
            .map_err(|e| ("countdown", e))?;
        let penalty = self
            .failure_penalty
            .to_duration()
            .map_err(|e| ("failure_penalty", e))?;
        let step = self
            .wires
            .step_timeout
            .to_duration()
            .map_err(|e| ("wires.step_timeout", e))?;
        let tick = self
            .tick_interval
            .to_duration()
            .map_err(|e| ("tick_interval", e))?;

        let settings = GameSettings {
            code: self.code.clone(),
            countdown_seconds: countdown.as_secs(),
            failure_penalty_seconds: penalty.as_secs(),
            max_attempts: self.max_attempts,
            wire_sequence: self.wires.sequence.clone(),
            wire_step_seconds: step.as_secs(),
        };
        Ok((settings, tick))
    }
}
