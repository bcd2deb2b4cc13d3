//! Bomb engine
//!
//! [`BombEngine`] owns the one [`GameState`] and the countdown
//! [`Scheduler`] behind a single mutex. Every operation follows the same
//! shape: lock, read-modify-write, commit a snapshot, unlock, notify. The
//! lock is never held across an `.await`, and the notifier always runs
//! after it is released.

use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::observability::metrics;

use super::disarm::SubmitOutcome;
use super::scheduler::{Scheduler, TickTarget};
use super::state::{BombStatus, ExplosionCause, GameSettings, GameState, Snapshot, Tick};
use super::wire::{ALREADY_ACTIVATED, PressOutcome, WRONG_ORDER};

/// Default scheduler period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

struct Inner {
    game: GameState,
    scheduler: Scheduler,
}

struct Shared {
    inner: Mutex<Inner>,
    notifier: Arc<dyn Notifier>,
}

/// Routes scheduler ticks back into the engine without keeping it alive.
struct EngineTicks(Weak<Shared>);

#[async_trait::async_trait]
impl TickTarget for EngineTicks {
    async fn on_tick(&self, generation: u64) -> ControlFlow<()> {
        let Some(shared) = self.0.upgrade() else {
            return ControlFlow::Break(());
        };
        BombEngine { shared }.apply_tick(generation).await
    }
}

/// Status change observed across one mutation.
struct Transition {
    from: BombStatus,
    to: BombStatus,
    remaining_seconds: u64,
}

/// Handle to the game engine.
///
/// Cheap to clone; all clones share the same state and scheduler.
#[derive(Clone)]
pub struct BombEngine {
    shared: Arc<Shared>,
}

impl BombEngine {
    /// Creates an engine at the start of a round.
    ///
    /// The countdown does not run until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(settings: GameSettings, tick_interval: Duration, notifier: Arc<dyn Notifier>) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let ticks: Arc<dyn TickTarget> = Arc::new(EngineTicks(weak.clone()));
            Shared {
                inner: Mutex::new(Inner {
                    game: GameState::new(settings),
                    scheduler: Scheduler::new(ticks, tick_interval),
                }),
                notifier,
            }
        });
        Self { shared }
    }

    /// Starts the countdown on the initial round. Must be called from
    /// within a tokio runtime. No-op when already ticking or not armed.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.game.status() == BombStatus::Armed && !inner.scheduler.is_running() {
            inner.scheduler.start();
            info!(
                remaining_seconds = inner.game.remaining_seconds(),
                "countdown started"
            );
        }
    }

    /// Stops the countdown task and waits for it to finish.
    pub async fn shutdown(&self) {
        let handle = self.lock().scheduler.stop();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "tick task ended abnormally");
            }
        }
    }

    /// Returns a consistent snapshot. Does not notify.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        self.lock().game.snapshot()
    }

    /// Whether the countdown task is live.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.lock().scheduler.is_running()
    }

    /// Configured round constants.
    #[must_use]
    pub fn settings(&self) -> GameSettings {
        self.lock().game.settings().clone()
    }

    // ========================================================================
    // Player operations
    // ========================================================================

    /// Submits a disarm code.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] when the bomb is not armed.
    /// Observers are notified either way.
    pub async fn submit_code(&self, code: &str) -> Result<SubmitOutcome, EngineError> {
        let (result, snapshot) = self.mutate(|inner| inner.game.submit_code(code)).await;

        match &result {
            Ok(outcome) if outcome.success => metrics::record_code_submission("disarmed"),
            Ok(outcome) => {
                metrics::record_code_submission("wrong");
                debug!(
                    failed_attempts = snapshot.failed_attempts,
                    remaining_seconds = snapshot.remaining_seconds,
                    reason = %outcome.reason,
                    "wrong code"
                );
            }
            Err(e) => {
                metrics::record_code_submission("rejected");
                debug!(error = %e, "code submission rejected");
            }
        }
        result
    }

    /// Presses wire `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] when the bomb is not armed.
    /// Observers are notified either way.
    pub async fn press_wire(&self, id: &str) -> Result<PressOutcome, EngineError> {
        let (result, snapshot) = self.mutate(|inner| inner.game.press_wire(id)).await;

        match &result {
            Ok(outcome) => {
                let label = if outcome.message == ALREADY_ACTIVATED {
                    "already"
                } else if outcome.completed {
                    "complete"
                } else if outcome.message == WRONG_ORDER {
                    "wrong"
                } else {
                    "progress"
                };
                metrics::record_wire_press(label);
                debug!(
                    wire = id,
                    activation_index = snapshot.activation_index,
                    activation_total = snapshot.activation_total,
                    message = %outcome.message,
                    "wire pressed"
                );
                if label == "complete" {
                    info!("wire sequence complete, keypad enabled");
                }
            }
            Err(e) => {
                metrics::record_wire_press("rejected");
                debug!(wire = id, error = %e, "wire press rejected");
            }
        }
        result
    }

    // ========================================================================
    // Operator operations
    // ========================================================================

    /// Counts one failed attempt without a code. No-op unless armed.
    pub async fn register_fail(&self) -> Snapshot {
        metrics::record_admin_action("register_fail");
        let (applied, snapshot) = self.mutate(|inner| inner.game.register_fail()).await;
        debug!(applied, failed_attempts = snapshot.failed_attempts, "register fail");
        snapshot
    }

    /// Reverts one failed attempt and refunds its penalty. No-op unless
    /// armed with at least one failure.
    pub async fn undo_fail(&self) -> Snapshot {
        metrics::record_admin_action("undo_fail");
        let (applied, snapshot) = self.mutate(|inner| inner.game.undo_fail()).await;
        debug!(applied, failed_attempts = snapshot.failed_attempts, "undo fail");
        snapshot
    }

    /// Freezes the countdown. Ticks keep arriving as heartbeats.
    pub async fn pause(&self) -> Snapshot {
        metrics::record_admin_action("pause");
        let ((), snapshot) = self.mutate(|inner| inner.game.pause()).await;
        info!(remaining_seconds = snapshot.remaining_seconds, "countdown paused");
        snapshot
    }

    /// Unfreezes the countdown, restarting the scheduler if it had stopped.
    pub async fn resume(&self) -> Snapshot {
        metrics::record_admin_action("resume");
        let ((), snapshot) = self
            .mutate(|inner| {
                inner.game.resume();
                if inner.game.status() == BombStatus::Armed && !inner.scheduler.is_running() {
                    inner.scheduler.start();
                }
            })
            .await;
        info!(remaining_seconds = snapshot.remaining_seconds, "countdown resumed");
        snapshot
    }

    /// Starts a new round from the configured constants.
    pub async fn reset(&self) -> Snapshot {
        metrics::record_admin_action("reset");
        let ((), snapshot) = self
            .mutate(|inner| {
                inner.game.reset();
                inner.scheduler.start();
            })
            .await;
        info!(remaining_seconds = snapshot.remaining_seconds, "round reset");
        snapshot
    }

    /// Overrides the countdown and re-arms the bomb.
    ///
    /// Negative `seconds` are clamped to zero. The scheduler runs unless
    /// the bomb ends up paused.
    pub async fn set_time(&self, seconds: i64, autostart: Option<bool>) -> Snapshot {
        metrics::record_admin_action("set_time");
        let ((), snapshot) = self
            .mutate(|inner| {
                inner.game.set_time(seconds, autostart);
                if inner.game.is_paused() {
                    inner.scheduler.stop();
                } else {
                    inner.scheduler.start();
                }
            })
            .await;
        info!(
            remaining_seconds = snapshot.remaining_seconds,
            paused = snapshot.paused,
            "countdown set"
        );
        snapshot
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("engine lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Runs `f` under the lock, commits, then notifies outside it.
    ///
    /// Reaching a terminal status stops the scheduler.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> (T, Snapshot) {
        let (value, snapshot, transition) = {
            let mut inner = self.lock();
            let from = inner.game.status();
            let value = f(&mut *inner);
            let to = inner.game.status();
            if to.is_terminal() {
                inner.scheduler.stop();
            }
            let transition = (from != to).then(|| Transition {
                from,
                to,
                remaining_seconds: inner.game.remaining_seconds(),
            });
            let cause = inner.game.explosion_cause();
            (value, inner.game.commit(), transition.map(|t| (t, cause)))
        };

        if let Some((transition, cause)) = transition {
            Self::report_transition(&transition, cause);
        }
        metrics::set_remaining_seconds(snapshot.remaining_seconds);
        self.shared.notifier.notify(&snapshot).await;
        (value, snapshot)
    }

    fn report_transition(t: &Transition, cause: Option<ExplosionCause>) {
        match t.to {
            BombStatus::Disarmed => {
                metrics::record_disarm();
                info!(remaining_seconds = t.remaining_seconds, "bomb disarmed");
            }
            BombStatus::Exploded => {
                if let Some(cause) = cause {
                    metrics::record_explosion(cause);
                }
                info!(
                    cause = cause.map(ExplosionCause::as_str),
                    remaining_seconds = t.remaining_seconds,
                    "bomb exploded"
                );
            }
            BombStatus::Armed => {
                info!(from = %t.from, remaining_seconds = t.remaining_seconds, "bomb re-armed");
            }
        }
    }

    /// Applies one tick of scheduler `generation`.
    async fn apply_tick(&self, generation: u64) -> ControlFlow<()> {
        let (snapshot, flow, transition) = {
            let mut inner = self.lock();
            if !inner.scheduler.is_current(generation) {
                return ControlFlow::Break(());
            }

            let Ok(tick) = catch_unwind(AssertUnwindSafe(|| inner.game.tick())) else {
                error!(generation, "tick panicked, skipping");
                return ControlFlow::Continue(());
            };

            let mut transition = None;
            let flow = match tick {
                Tick::Inert => {
                    inner.scheduler.stop();
                    return ControlFlow::Break(());
                }
                Tick::Heartbeat => ControlFlow::Continue(()),
                Tick::Advanced { wire_timed_out } => {
                    metrics::record_tick();
                    if wire_timed_out {
                        debug!("wire step timed out, puzzle restarted");
                    }
                    ControlFlow::Continue(())
                }
                Tick::Exploded => {
                    metrics::record_tick();
                    inner.scheduler.stop();
                    transition = Some(Transition {
                        from: BombStatus::Armed,
                        to: BombStatus::Exploded,
                        remaining_seconds: 0,
                    });
                    ControlFlow::Break(())
                }
            };
            let cause = inner.game.explosion_cause();
            (inner.game.commit(), flow, transition.map(|t| (t, cause)))
        };

        if let Some((transition, cause)) = transition {
            Self::report_transition(&transition, cause);
        }
        metrics::set_remaining_seconds(snapshot.remaining_seconds);
        self.shared.notifier.notify(&snapshot).await;
        flow
    }
}

impl std::fmt::Debug for BombEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("BombEngine")
            .field("status", &inner.game.status())
            .field("remaining_seconds", &inner.game.remaining_seconds())
            .field("scheduler", &inner.scheduler)
            .finish_non_exhaustive()
    }
}
