//! Observability utilities.

mod log;
mod subscriber;
mod timer;

pub use log::{LogLevel, LogLine, StepLog};
pub use subscriber::{build_subscriber, init_tracing, LogFormat};
pub use timer::SpanTimer;
