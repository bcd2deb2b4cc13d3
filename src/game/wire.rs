//! Wire activation puzzle
//!
//! An ordered sequence-matching game: players press wires in the
//! configured order, each press within `wire_step_seconds` of the
//! previous one. Completing the sequence enables the keypad. The step
//! timeout is counted down by the scheduler tick, never by a press.

use crate::error::EngineError;

use super::state::{BombStatus, GameState};

/// Feedback when a press arrives while the bomb is not armed.
pub const NOT_ACTIVATABLE: &str = "not activatable now";
/// Feedback for presses after the puzzle is solved.
pub const ALREADY_ACTIVATED: &str = "already activated";
/// Feedback for the press that completes the sequence.
pub const ACTIVATION_COMPLETE: &str = "activation complete";
/// Feedback for an out-of-order press.
pub const WRONG_ORDER: &str = "wrong order, restart from first wire";
/// Feedback when the step timer runs out.
pub const STEP_TIMED_OUT: &str = "too slow, restart from first wire";

/// Result of a wire press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PressOutcome {
    /// Whether the puzzle is solved after this press.
    pub completed: bool,
    /// Feedback to show the player.
    pub message: String,
}

/// Compares wire identifiers ignoring case.
fn same_wire(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

impl GameState {
    /// Registers a press of wire `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] when the bomb is not armed;
    /// the state is left untouched.
    pub fn press_wire(&mut self, id: &str) -> Result<PressOutcome, EngineError> {
        if self.status != BombStatus::Armed {
            return Err(EngineError::invalid_state(self.status, NOT_ACTIVATABLE));
        }

        if self.code_enabled {
            return Ok(PressOutcome {
                completed: true,
                message: ALREADY_ACTIVATED.to_string(),
            });
        }

        let total = self.settings.wire_sequence.len();
        let expected = &self.settings.wire_sequence[self.activation_index];

        if !same_wire(id, expected) {
            self.reset_puzzle(WRONG_ORDER.to_string());
            return Ok(PressOutcome {
                completed: false,
                message: WRONG_ORDER.to_string(),
            });
        }

        self.activation_index += 1;
        self.wire_remaining_seconds = self.settings.wire_step_seconds;

        let (completed, message) = if self.activation_index == total {
            self.code_enabled = true;
            self.wire_remaining_seconds = 0;
            (true, ACTIVATION_COMPLETE.to_string())
        } else {
            (
                false,
                format!("correct wire ({}/{total})", self.activation_index),
            )
        };

        self.last_activation_message.clone_from(&message);
        Ok(PressOutcome { completed, message })
    }

    /// Advances the step timer by one second.
    ///
    /// Returns `true` when the timer ran out and the puzzle was reset.
    pub(super) fn tick_wire(&mut self) -> bool {
        if self.activation_index == 0 || self.code_enabled {
            return false;
        }

        self.wire_remaining_seconds = self.wire_remaining_seconds.saturating_sub(1);
        if self.wire_remaining_seconds > 0 {
            return false;
        }

        self.reset_puzzle(STEP_TIMED_OUT.to_string());
        true
    }

    /// Returns the puzzle to its first step with the given feedback.
    pub(super) fn reset_puzzle(&mut self, message: String) {
        self.activation_index = 0;
        self.wire_remaining_seconds = 0;
        self.code_enabled = self.settings.wire_sequence.is_empty();
        self.last_activation_message = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{GameSettings, Tick};

    fn state(sequence: &[&str], step: u64) -> GameState {
        GameState::new(GameSettings {
            countdown_seconds: 600,
            wire_sequence: sequence.iter().map(|s| (*s).to_string()).collect(),
            wire_step_seconds: step,
            ..GameSettings::default()
        })
    }

    #[test]
    fn correct_press_reports_progress() {
        let mut game = state(&["red", "blue", "green"], 5);
        let outcome = game.press_wire("red").unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.message, "correct wire (1/3)");

        let snap = game.snapshot();
        assert_eq!(snap.activation_index, 1);
        assert_eq!(snap.wire_remaining_seconds, 5);
        assert_eq!(snap.last_activation_message, "correct wire (1/3)");
        assert!(!snap.code_enabled);
    }

    #[test]
    fn press_is_case_insensitive() {
        let mut game = state(&["red", "Blue"], 5);
        game.press_wire("RED").unwrap();
        let outcome = game.press_wire("bLuE").unwrap();
        assert!(outcome.completed);
    }

    #[test]
    fn completing_sequence_enables_code() {
        let mut game = state(&["red", "blue"], 5);
        game.press_wire("red").unwrap();
        let outcome = game.press_wire("blue").unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.message, ACTIVATION_COMPLETE);

        let snap = game.snapshot();
        assert!(snap.code_enabled);
        assert_eq!(snap.activation_index, 2);
        assert_eq!(snap.wire_remaining_seconds, 0);
    }

    #[test]
    fn repeated_wire_in_sequence() {
        let mut game = state(&["red", "red", "blue"], 5);
        assert_eq!(game.press_wire("red").unwrap().message, "correct wire (1/3)");
        assert_eq!(game.press_wire("red").unwrap().message, "correct wire (2/3)");
        assert!(game.press_wire("blue").unwrap().completed);
    }

    #[test]
    fn wrong_order_restarts() {
        let mut game = state(&["red", "blue"], 5);
        let outcome = game.press_wire("blue").unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.message, WRONG_ORDER);
        assert_eq!(game.snapshot().activation_index, 0);

        game.press_wire("red").unwrap();
        game.press_wire("red").unwrap();
        let snap = game.snapshot();
        assert_eq!(snap.activation_index, 0);
        assert_eq!(snap.wire_remaining_seconds, 0);
        assert_eq!(snap.last_activation_message, WRONG_ORDER);
    }

    #[test]
    fn press_after_completion_is_idempotent() {
        let mut game = state(&["red"], 5);
        game.press_wire("red").unwrap();
        let before = game.snapshot();

        for id in ["red", "blue", ""] {
            let outcome = game.press_wire(id).unwrap();
            assert!(outcome.completed);
            assert_eq!(outcome.message, ALREADY_ACTIVATED);
            assert_eq!(game.snapshot(), before);
        }
    }

    #[test]
    fn press_when_not_armed_is_rejected() {
        let mut game = state(&["red"], 5);
        game.status = BombStatus::Disarmed;
        let before = game.snapshot();
        let err = game.press_wire("red").unwrap_err();
        assert_eq!(err.message(), NOT_ACTIVATABLE);
        assert_eq!(game.snapshot(), before);
    }

    #[test]
    fn step_timeout_resets_puzzle() {
        let mut game = state(&["red", "blue"], 5);
        game.press_wire("red").unwrap();

        for _ in 0..4 {
            assert_eq!(
                game.tick(),
                Tick::Advanced {
                    wire_timed_out: false
                }
            );
        }
        assert_eq!(game.snapshot().wire_remaining_seconds, 1);
        assert_eq!(
            game.tick(),
            Tick::Advanced {
                wire_timed_out: true
            }
        );

        let snap = game.snapshot();
        assert_eq!(snap.activation_index, 0);
        assert_eq!(snap.wire_remaining_seconds, 0);
        assert_eq!(snap.last_activation_message, STEP_TIMED_OUT);
        assert_eq!(snap.status, BombStatus::Armed);
        assert_eq!(snap.remaining_seconds, 595);
    }

    #[test]
    fn correct_press_restarts_step_timer() {
        let mut game = state(&["red", "blue", "green"], 5);
        game.press_wire("red").unwrap();
        game.tick();
        game.tick();
        game.press_wire("blue").unwrap();
        assert_eq!(game.snapshot().wire_remaining_seconds, 5);
    }

    #[test]
    fn no_timer_before_first_press() {
        let mut game = state(&["red", "blue"], 1);
        for _ in 0..10 {
            game.tick();
        }
        let snap = game.snapshot();
        assert_eq!(snap.activation_index, 0);
        assert_eq!(snap.last_activation_message, "");
    }

    #[test]
    fn step_timer_frozen_while_paused() {
        let mut game = state(&["red", "blue"], 2);
        game.press_wire("red").unwrap();
        game.pause();
        for _ in 0..5 {
            assert_eq!(game.tick(), Tick::Heartbeat);
        }
        assert_eq!(game.snapshot().activation_index, 1);
        assert_eq!(game.snapshot().wire_remaining_seconds, 2);
    }

    #[test]
    fn solved_puzzle_never_times_out() {
        let mut game = state(&["red"], 1);
        game.press_wire("red").unwrap();
        for _ in 0..5 {
            game.tick();
        }
        assert!(game.snapshot().code_enabled);
    }

    #[test]
    fn empty_sequence_is_always_activated() {
        let mut game = state(&[], 5);
        let outcome = game.press_wire("red").unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.message, ALREADY_ACTIVATED);
    }

    #[test]
    fn reset_clears_puzzle() {
        let mut game = state(&["red", "blue"], 5);
        game.press_wire("red").unwrap();
        game.press_wire("blue").unwrap();
        game.reset();
        let snap = game.snapshot();
        assert!(!snap.code_enabled);
        assert_eq!(snap.activation_index, 0);
        assert_eq!(snap.last_activation_message, "");
    }

    #[test]
    fn same_wire_folds_case() {
        assert!(same_wire("Red", "rED"));
        assert!(!same_wire("red", "reds"));
        assert!(same_wire("", ""));
    }
}
