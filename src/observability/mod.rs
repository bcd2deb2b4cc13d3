//! Observability
//!
//! Logging, metrics, and the structured JSONL event stream describing
//! how a round unfolds.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
