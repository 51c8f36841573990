//! C12 — Observability Emitter plus process-wide tracing initialization.

pub mod emitter;
pub mod error;
pub mod tracing_init;

pub use emitter::{emit_or_warn, Emitter, ObservabilityEvent, Stream};
pub use error::{OtelError, Result};
pub use tracing_init::init_tracing;
