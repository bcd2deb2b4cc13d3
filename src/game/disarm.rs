//! Code disarm handler
//!
//! Code submissions and the operator's force-fail / undo-fail overrides.
//! A failure costs one attempt and `failure_penalty_seconds` of countdown;
//! running out of either explodes the bomb.

use crate::error::EngineError;

use super::state::{BombStatus, ExplosionCause, GameState};

/// Reason returned when a code is submitted to a bomb that is not armed.
pub const NOT_DISARMABLE: &str = "the bomb is not in a disarmable state";

/// Result of a code submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Whether the bomb was disarmed.
    pub success: bool,
    /// Reason reflecting the resulting status.
    pub reason: String,
}

impl GameState {
    /// Checks `code` against the secret.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] when the bomb is not armed;
    /// the state is left untouched.
    pub fn submit_code(&mut self, code: &str) -> Result<SubmitOutcome, EngineError> {
        if self.status != BombStatus::Armed {
            return Err(EngineError::invalid_state(self.status, NOT_DISARMABLE));
        }

        if code == self.settings.code {
            self.status = BombStatus::Disarmed;
            return Ok(SubmitOutcome {
                success: true,
                reason: "Disarmed".to_string(),
            });
        }

        self.apply_failure();
        Ok(SubmitOutcome {
            success: false,
            reason: self.failure_reason(),
        })
    }

    /// Applies a failed attempt without a code. No-op unless armed.
    ///
    /// Returns whether the failure was applied.
    pub fn register_fail(&mut self) -> bool {
        if self.status != BombStatus::Armed {
            return false;
        }
        self.apply_failure();
        true
    }

    /// Reverts one failed attempt and refunds its penalty.
    ///
    /// No-op unless armed with at least one failed attempt. Returns whether
    /// anything changed.
    pub fn undo_fail(&mut self) -> bool {
        if self.status != BombStatus::Armed || self.failed_attempts == 0 {
            return false;
        }
        self.failed_attempts -= 1;
        self.remaining_seconds = self
            .remaining_seconds
            .saturating_add(self.settings.failure_penalty_seconds);
        true
    }

    /// One failure step: attempt count, time penalty, explosion checks.
    ///
    /// Either condition alone explodes the bomb; when both hold the
    /// penalty is reported as the cause.
    fn apply_failure(&mut self) {
        self.failed_attempts = self
            .failed_attempts
            .saturating_add(1)
            .min(self.settings.max_attempts);
        self.remaining_seconds = self
            .remaining_seconds
            .saturating_sub(self.settings.failure_penalty_seconds);

        let cause = if self.remaining_seconds == 0 {
            Some(ExplosionCause::Penalty)
        } else if self.failed_attempts >= self.settings.max_attempts {
            Some(ExplosionCause::Attempts)
        } else {
            None
        };

        if let Some(cause) = cause {
            self.explode(cause);
        }
    }

    fn failure_reason(&self) -> String {
        let used = self.failed_attempts;
        let max = self.settings.max_attempts;
        if self.status == BombStatus::Exploded {
            format!("wrong code, the bomb exploded ({used}/{max} attempts used)")
        } else {
            format!("wrong code, {used}/{max} attempts used")
        }
    }
}
