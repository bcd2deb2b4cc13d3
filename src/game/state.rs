//! Game state record
//!
//! [`GameState`] is the single mutable record of truth for one bomb. It
//! is a plain struct with synchronous transitions; all locking lives in
//! [`BombEngine`](super::BombEngine), which owns the only instance.

use serde::{Deserialize, Serialize};

/// Round status of the bomb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BombStatus {
    /// Counting down and disarmable.
    Armed,
    /// Correct code entered. Terminal.
    Disarmed,
    /// Countdown, penalty or attempt limit ran out. Terminal.
    Exploded,
}

impl BombStatus {
    /// Returns whether no further game transitions can happen from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disarmed | Self::Exploded)
    }

    /// Lowercase label used for metrics and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::Disarmed => "disarmed",
            Self::Exploded => "exploded",
        }
    }
}

impl std::fmt::Display for BombStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Armed => "Armed",
            Self::Disarmed => "Disarmed",
            Self::Exploded => "Exploded",
        };
        f.write_str(name)
    }
}

/// What made the bomb explode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplosionCause {
    /// The countdown reached zero on a tick.
    Countdown,
    /// A failure penalty consumed the remaining time.
    Penalty,
    /// The failed attempt ceiling was reached.
    Attempts,
}

impl ExplosionCause {
    /// Lowercase label used for metrics and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Countdown => "countdown",
            Self::Penalty => "penalty",
            Self::Attempts => "attempts",
        }
    }
}

/// Round constants fixed at construction.
///
/// Only `Reset` and `SetTime` reinitialize the mutable state derived from
/// these; the values themselves never change while the process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Secret code, compared exactly.
    pub code: String,
    /// Initial countdown of every round, in seconds.
    pub countdown_seconds: u64,
    /// Seconds removed from the countdown per failed attempt.
    pub failure_penalty_seconds: u64,
    /// Failed attempts that explode the bomb.
    pub max_attempts: u32,
    /// Wire identifiers that must be pressed in order.
    pub wire_sequence: Vec<String>,
    /// Seconds allowed between two consecutive correct presses.
    pub wire_step_seconds: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            code: "1234".to_string(),
            countdown_seconds: 90 * 60,
            failure_penalty_seconds: 60,
            max_attempts: 20,
            wire_sequence: ["red", "blue", "green", "yellow", "white", "black"]
                .into_iter()
                .map(String::from)
                .collect(),
            wire_step_seconds: 10,
        }
    }
}

/// Immutable copy of the game state at one instant.
///
/// Observers should treat every snapshot as a full replacement and may
/// use `revision` to drop snapshots that arrive out of order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Round status.
    pub status: BombStatus,
    /// Seconds left on the countdown.
    pub remaining_seconds: u64,
    /// Whether the countdown is frozen.
    pub paused: bool,
    /// Failed attempts in this round.
    pub failed_attempts: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Whether the wire puzzle is solved and the keypad should be shown.
    pub code_enabled: bool,
    /// Correct presses in a row.
    pub activation_index: usize,
    /// Length of the wire sequence.
    pub activation_total: usize,
    /// Seconds left to press the next wire (0 when no step is running).
    pub wire_remaining_seconds: u64,
    /// Feedback for the latest wire press or step timeout.
    #[serde(rename = "lastActivationMsg", alias = "lastActivationMessage")]
    pub last_activation_message: String,
    /// Number of committed mutations, monotonically increasing.
    pub revision: u64,
}

/// Effect of one scheduler tick on the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not armed; nothing changed and the scheduler should stop.
    Inert,
    /// Paused; nothing changed but observers get a pulse.
    Heartbeat,
    /// One second elapsed.
    Advanced {
        /// The wire step timer ran out and the puzzle was reset.
        wire_timed_out: bool,
    },
    /// The countdown reached zero.
    Exploded,
}

/// The mutable game record.
#[derive(Debug, Clone)]
pub struct GameState {
    pub(super) settings: GameSettings,
    pub(super) status: BombStatus,
    pub(super) remaining_seconds: u64,
    pub(super) paused: bool,
    pub(super) failed_attempts: u32,
    pub(super) activation_index: usize,
    pub(super) wire_remaining_seconds: u64,
    pub(super) code_enabled: bool,
    pub(super) last_activation_message: String,
    pub(super) explosion_cause: Option<ExplosionCause>,
    revision: u64,
}

impl GameState {
    /// Creates a state at the start of a round.
    #[must_use]
    pub fn new(settings: GameSettings) -> Self {
        let mut state = Self {
            status: BombStatus::Armed,
            remaining_seconds: 0,
            paused: false,
            failed_attempts: 0,
            activation_index: 0,
            wire_remaining_seconds: 0,
            code_enabled: false,
            last_activation_message: String::new(),
            explosion_cause: None,
            revision: 0,
            settings,
        };
        state.reset();
        state
    }

    /// Reinitializes every mutable field to the start-of-round values.
    ///
    /// Configured constants and the revision counter are preserved.
    pub fn reset(&mut self) {
        self.status = BombStatus::Armed;
        self.remaining_seconds = self.settings.countdown_seconds;
        self.paused = false;
        self.failed_attempts = 0;
        self.explosion_cause = None;
        self.reset_puzzle(String::new());
    }

    /// Overrides the countdown and re-arms the bomb.
    ///
    /// Negative `seconds` are clamped to zero. When `autostart` is given,
    /// `paused` becomes its negation; otherwise the pause flag is kept.
    /// Failed attempts are cleared. The wire puzzle is left as is.
    pub fn set_time(&mut self, seconds: i64, autostart: Option<bool>) {
        self.remaining_seconds = u64::try_from(seconds).unwrap_or(0);
        if let Some(start) = autostart {
            self.paused = !start;
        }
        self.status = BombStatus::Armed;
        self.failed_attempts = 0;
        self.explosion_cause = None;
    }

    /// Freezes the countdown. Valid in any status.
    pub const fn pause(&mut self) {
        self.paused = true;
    }

    /// Unfreezes the countdown. Valid in any status.
    pub const fn resume(&mut self) {
        self.paused = false;
    }

    /// Applies one scheduler tick.
    pub fn tick(&mut self) -> Tick {
        if self.status != BombStatus::Armed {
            return Tick::Inert;
        }
        if self.paused {
            return Tick::Heartbeat;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.explode(ExplosionCause::Countdown);
            return Tick::Exploded;
        }

        let wire_timed_out = self.tick_wire();
        Tick::Advanced { wire_timed_out }
    }

    /// Returns a snapshot without counting it as a mutation.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            remaining_seconds: self.remaining_seconds,
            paused: self.paused,
            failed_attempts: self.failed_attempts,
            max_attempts: self.settings.max_attempts,
            code_enabled: self.code_enabled,
            activation_index: self.activation_index,
            activation_total: self.settings.wire_sequence.len(),
            wire_remaining_seconds: self.wire_remaining_seconds,
            last_activation_message: self.last_activation_message.clone(),
            revision: self.revision,
        }
    }

    /// Bumps the revision and returns the snapshot to hand to observers.
    pub fn commit(&mut self) -> Snapshot {
        self.revision = self.revision.saturating_add(1);
        self.snapshot()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> BombStatus {
        self.status
    }

    /// Whether the countdown is frozen.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds left on the countdown.
    #[must_use]
    pub const fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    /// Failed attempts in this round.
    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Why the bomb exploded, if it did.
    #[must_use]
    pub const fn explosion_cause(&self) -> Option<ExplosionCause> {
        self.explosion_cause
    }

    /// Configured constants.
    #[must_use]
    pub const fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub(super) const fn explode(&mut self, cause: ExplosionCause) {
        self.status = BombStatus::Exploded;
        self.explosion_cause = Some(cause);
    }
}
