//! Telemetry: structured logging setup and metrics.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_enqueued, record_finished, record_queue_depth, record_rejected, record_step,
};
