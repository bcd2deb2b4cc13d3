//! Game engine for the bomb prop.
//!
//! The game is one [`GameState`] record mutated by four components:
//!
//! - the countdown [`Scheduler`], a 1 Hz tick task
//! - the code disarm handler ([`GameState::submit_code`] and the
//!   operator's force-fail / undo-fail overrides)
//! - the wire activation puzzle ([`GameState::press_wire`])
//! - operator controls (pause, resume, reset, set time)
//!
//! [`BombEngine`] serializes all of them behind a single lock and hands
//! every resulting [`Snapshot`] to a [`Notifier`](crate::notifier::Notifier).

pub mod disarm;
pub mod engine;
pub mod scheduler;
pub mod state;
pub mod wire;

pub use disarm::SubmitOutcome;
pub use engine::{BombEngine, DEFAULT_TICK_INTERVAL};
pub use scheduler::{Scheduler, TickTarget};
pub use state::{BombStatus, ExplosionCause, GameSettings, GameState, Snapshot, Tick};
pub use wire::PressOutcome;
