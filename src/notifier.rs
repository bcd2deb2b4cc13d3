//! Snapshot delivery to observers.
//!
//! The engine hands every committed [`Snapshot`] to one [`Notifier`] after
//! releasing its lock. Delivery is fire-and-forget: implementations
//! swallow and log their own failures, and observers must tolerate
//! duplicates and reordering (the snapshot `revision` orders them).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::game::Snapshot;
use crate::observability::events::{Event, EventEmitter};

/// Default number of snapshots buffered per broadcast subscriber.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Receives every snapshot the engine commits.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `snapshot` to this notifier's observers.
    async fn notify(&self, snapshot: &Snapshot);
}

/// Publishes snapshots on a `tokio::sync::broadcast` channel.
///
/// Each subscriber (one per connected display) sees every snapshot sent
/// after it subscribed; slow subscribers lag and skip ahead.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Snapshot>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering `capacity` snapshots per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[async_trait::async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, snapshot: &Snapshot) {
        // No subscribers is fine
        if self.tx.send(snapshot.clone()).is_err() {
            trace!(revision = snapshot.revision, "no state subscribers");
        }
    }
}

/// Turns snapshot diffs into structured [`Event`]s.
///
/// Compares each snapshot with the newest one seen so far and emits one
/// event per changed aspect. Snapshots older than the newest seen are
/// ignored.
#[derive(Debug)]
pub struct EventNotifier {
    emitter: Arc<EventEmitter>,
    last: Mutex<Option<Snapshot>>,
}

impl EventNotifier {
    /// Creates a notifier writing to `emitter`.
    #[must_use]
    pub const fn new(emitter: Arc<EventEmitter>) -> Self {
        Self {
            emitter,
            last: Mutex::new(None),
        }
    }

    /// Creates a notifier that diffs the first delivered snapshot against
    /// `baseline` instead of treating it as the baseline.
    #[must_use]
    pub const fn with_baseline(emitter: Arc<EventEmitter>, baseline: Snapshot) -> Self {
        Self {
            emitter,
            last: Mutex::new(Some(baseline)),
        }
    }

    fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<Event> {
        let timestamp = Utc::now();
        let mut events = Vec::new();

        let Some(previous) = previous else {
            return events;
        };

        if previous.status != current.status {
            events.push(Event::RoundStatusChanged {
                timestamp,
                from: previous.status,
                to: current.status,
                remaining_seconds: current.remaining_seconds,
            });
        }
        if previous.failed_attempts != current.failed_attempts {
            events.push(Event::AttemptsChanged {
                timestamp,
                failed_attempts: current.failed_attempts,
                max_attempts: current.max_attempts,
            });
        }
        if previous.activation_index != current.activation_index
            || previous.last_activation_message != current.last_activation_message
        {
            events.push(Event::WireProgress {
                timestamp,
                activation_index: current.activation_index,
                activation_total: current.activation_total,
                message: current.last_activation_message.clone(),
            });
        }
        events
    }
}

#[async_trait::async_trait]
impl Notifier for EventNotifier {
    async fn notify(&self, snapshot: &Snapshot) {
        let events = {
            let Ok(mut last) = self.last.lock() else {
                warn!("event notifier lock poisoned, dropping snapshot");
                return;
            };
            if last
                .as_ref()
                .is_some_and(|seen| seen.revision >= snapshot.revision)
            {
                return;
            }
            let events = Self::diff(last.as_ref(), snapshot);
            *last = Some(snapshot.clone());
            events
        };

        for event in events {
            self.emitter.emit(event);
        }
    }
}

/// Delivers each snapshot to several notifiers in order.
#[derive(Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a target.
    #[must_use]
    pub fn with(mut self, target: Arc<dyn Notifier>) -> Self {
        self.targets.push(target);
        self
    }
}

impl std::fmt::Debug for FanoutNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutNotifier")
            .field("targets", &self.targets.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, snapshot: &Snapshot) {
        for target in &self.targets {
            target.notify(snapshot).await;
        }
    }
}

/// Records every snapshot, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    snapshots: Mutex<Vec<Snapshot>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub(crate) fn last(&self) -> Option<Snapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, snapshot: &Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}
