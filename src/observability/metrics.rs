//! Metrics collection for `defuse`.
//!
//! Prometheus-compatible metrics with typed recording functions. Every
//! label value comes from a closed set so cardinality stays fixed.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::DefuseError;
use crate::game::ExplosionCause;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Administrative actions accepted as metric labels.
const KNOWN_ADMIN_ACTIONS: [&str; 6] = [
    "pause",
    "resume",
    "reset",
    "set_time",
    "register_fail",
    "undo_fail",
];

/// Returns the action name when known, `"__unknown__"` otherwise.
#[must_use]
pub fn sanitize_action_label(action: &str) -> &str {
    if KNOWN_ADMIN_ACTIONS.contains(&action) {
        action
    } else {
        "__unknown__"
    }
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `DefuseError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), DefuseError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| DefuseError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "defuse_code_submissions_total",
        "Code submissions by result"
    );
    describe_counter!("defuse_wire_presses_total", "Wire presses by result");
    describe_counter!("defuse_explosions_total", "Explosions by cause");
    describe_counter!("defuse_disarms_total", "Successful disarms");
    describe_counter!(
        "defuse_admin_actions_total",
        "Operator actions by action name"
    );
    describe_counter!("defuse_ticks_total", "Scheduler ticks applied");
    describe_gauge!("defuse_remaining_seconds", "Seconds left on the countdown");
    describe_gauge!("defuse_viewers_active", "Connected state stream viewers");
}

/// Records a code submission. `result` is `disarmed`, `wrong` or `rejected`.
pub fn record_code_submission(result: &'static str) {
    counter!("defuse_code_submissions_total", "result" => result).increment(1);
}

/// Records a wire press. `result` is `progress`, `complete`, `wrong`,
/// `already` or `rejected`.
pub fn record_wire_press(result: &'static str) {
    counter!("defuse_wire_presses_total", "result" => result).increment(1);
}

/// Records an explosion.
pub fn record_explosion(cause: ExplosionCause) {
    counter!("defuse_explosions_total", "cause" => cause.as_str()).increment(1);
}

/// Records a successful disarm.
pub fn record_disarm() {
    counter!("defuse_disarms_total").increment(1);
}

/// Records an operator action.
pub fn record_admin_action(action: &str) {
    let label = sanitize_action_label(action);
    counter!("defuse_admin_actions_total", "action" => label.to_owned()).increment(1);
}

/// Records one applied scheduler tick.
pub fn record_tick() {
    counter!("defuse_ticks_total").increment(1);
}

/// Sets the countdown gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_remaining_seconds(seconds: u64) {
    gauge!("defuse_remaining_seconds").set(seconds as f64);
}

/// Sets the number of connected stream viewers.
#[allow(clippy::cast_precision_loss)]
pub fn set_viewers_active(count: usize) {
    gauge!("defuse_viewers_active").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_known_action_returns_original() {
        for action in &KNOWN_ADMIN_ACTIONS {
            assert_eq!(sanitize_action_label(action), *action);
        }
    }

    #[test]
    fn sanitize_unknown_action_returns_unknown() {
        assert_eq!(sanitize_action_label("detonate"), "__unknown__");
        assert_eq!(sanitize_action_label(""), "__unknown__");
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_code_submission("wrong");
        record_wire_press("progress");
        record_explosion(ExplosionCause::Attempts);
        record_disarm();
        record_admin_action("reset");
        record_tick();
        set_remaining_seconds(42);
        set_viewers_active(3);
    }
}
