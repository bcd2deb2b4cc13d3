//! Countdown scheduler
//!
//! Owns at most one periodic tick task. Every start gets a fresh
//! generation and cancellation token; starting while running cancels the
//! previous task first. A task whose generation is no longer current must
//! do nothing, so each tick hands its generation back to the
//! [`TickTarget`], which re-checks it under the engine lock.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receiver of scheduler ticks.
#[async_trait::async_trait]
pub trait TickTarget: Send + Sync {
    /// Handles one tick of the task started with `generation`.
    ///
    /// Returning [`ControlFlow::Break`] ends the task.
    async fn on_tick(&self, generation: u64) -> ControlFlow<()>;
}

/// One running tick task.
struct Ticker {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop control over the periodic tick task.
///
/// Not synchronized itself; it lives inside the engine's locked state so
/// starts and stops are ordered with the mutations they accompany.
pub struct Scheduler {
    target: Arc<dyn TickTarget>,
    period: Duration,
    current: Option<Ticker>,
    next_generation: u64,
}

impl Scheduler {
    /// Creates an idle scheduler delivering ticks to `target` every `period`.
    #[must_use]
    pub fn new(target: Arc<dyn TickTarget>, period: Duration) -> Self {
        Self {
            target,
            period,
            current: None,
            next_generation: 1,
        }
    }

    /// Starts a new tick task, stopping the running one first.
    ///
    /// The first tick fires one `period` after the start. Must be called
    /// from within a tokio runtime.
    ///
    /// Returns the generation of the new task.
    pub fn start(&mut self) -> u64 {
        self.stop();

        let generation = self.next_generation;
        self.next_generation += 1;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let target = Arc::clone(&self.target);
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(generation, "tick task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if target.on_tick(generation).await.is_break() {
                            debug!(generation, "tick task finished");
                            break;
                        }
                    }
                }
            }
        });

        debug!(generation, period_ms = period.as_millis(), "scheduler started");
        self.current = Some(Ticker {
            generation,
            cancel,
            handle,
        });
        generation
    }

    /// Stops the running tick task. Idempotent.
    ///
    /// Returns the task handle so callers outside the lock can wait for
    /// it; `None` when nothing was running. The task is cancelled, never
    /// aborted, since `stop` may be called from the task itself.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        let ticker = self.current.take()?;
        ticker.cancel.cancel();
        debug!(generation = ticker.generation, "scheduler stopped");
        Some(ticker.handle)
    }

    /// Whether a tick task is live.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Whether `generation` is the live task.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|ticker| ticker.generation == generation)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("period", &self.period)
            .field("generation", &self.current.as_ref().map(|t| t.generation))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Counter {
        ticks: Mutex<Vec<u64>>,
        stop_after: Option<usize>,
    }

    impl Counter {
        fn ticks(&self) -> Vec<u64> {
            self.ticks.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl TickTarget for Counter {
        async fn on_tick(&self, generation: u64) -> ControlFlow<()> {
            let mut ticks = self.ticks.lock().unwrap();
            ticks.push(generation);
            if self.stop_after.is_some_and(|n| ticks.len() >= n) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    async fn advance(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_period() {
        let counter = Arc::new(Counter::default());
        let mut scheduler = Scheduler::new(counter.clone(), Duration::from_secs(1));
        let generation = scheduler.start();

        tokio::task::yield_now().await;
        assert!(counter.ticks().is_empty());

        advance(3).await;
        assert_eq!(counter.ticks(), vec![generation; 3]);
        assert!(scheduler.is_current(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_task() {
        let counter = Arc::new(Counter::default());
        let mut scheduler = Scheduler::new(counter.clone(), Duration::from_secs(1));
        let first = scheduler.start();
        advance(1).await;
        let second = scheduler.start();
        assert_ne!(first, second);
        assert!(!scheduler.is_current(first));

        advance(2).await;
        assert_eq!(counter.ticks(), vec![first, second, second]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let counter = Arc::new(Counter::default());
        let mut scheduler = Scheduler::new(counter.clone(), Duration::from_secs(1));
        scheduler.start();

        let handle = scheduler.stop().unwrap();
        assert!(scheduler.stop().is_none());
        assert!(!scheduler.is_running());
        handle.await.unwrap();

        advance(3).await;
        assert!(counter.ticks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn break_ends_task() {
        let counter = Arc::new(Counter {
            stop_after: Some(2),
            ..Counter::default()
        });
        let mut scheduler = Scheduler::new(counter.clone(), Duration::from_secs(1));
        scheduler.start();

        advance(5).await;
        assert_eq!(counter.ticks().len(), 2);
        let handle = scheduler.stop().unwrap();
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_task() {
        let counter = Arc::new(Counter::default());
        let mut scheduler = Scheduler::new(counter.clone(), Duration::from_secs(1));
        scheduler.start();
        drop(scheduler);

        advance(3).await;
        assert!(counter.ticks().is_empty());
    }
}
