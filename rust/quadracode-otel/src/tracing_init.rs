//! Process-wide tracing initialization. Grounded on `knhk-sidecar::main`'s
//! `tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env())`
//! bootstrap, extended with a JSON formatter (matching the teacher's
//! `tracing-subscriber` feature set, which already carries the `json`
//! feature in its `Cargo.toml`) and a feature-gated OTLP layer.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{OtelError, Result};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global `tracing` subscriber: an `EnvFilter` read from
/// `RUST_LOG` (defaulting to `info` when unset) plus a JSON-formatted
/// fmt layer. When the `otlp` feature is enabled and
/// `QUADRACODE_OTLP_ENDPOINT` is set, also wires an OTLP span exporter.
///
/// Idempotent within a process: a second call returns
/// `OtelError::AlreadyInitialized` rather than panicking, since
/// `tracing::subscriber::set_global_default` can only succeed once.
pub fn init_tracing() -> Result<()> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(OtelError::AlreadyInitialized);
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().json().with_target(true).with_current_span(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    #[cfg(feature = "otlp")]
    {
        if let Some(otlp_layer) = otlp::build_layer()? {
            registry.with(otlp_layer).try_init().map_err(|e| OtelError::SetGlobalDefault(e.to_string()))?;
            return Ok(());
        }
    }

    registry.try_init().map_err(|e| OtelError::SetGlobalDefault(e.to_string()))?;
    Ok(())
}

#[cfg(feature = "otlp")]
mod otlp {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use tracing_opentelemetry::OpenTelemetryLayer;

    use super::Result;

    /// Builds the OTLP tracing layer when `QUADRACODE_OTLP_ENDPOINT` names a
    /// collector endpoint; otherwise returns `None` so the caller falls back
    /// to stdout-only JSON logging (spec §4.12: "off by default, core never
    /// requires a collector to run tests").
    pub(super) fn build_layer<S>() -> Result<Option<OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>>>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let Ok(endpoint) = std::env::var("QUADRACODE_OTLP_ENDPOINT") else {
            return Ok(None);
        };

        let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).build().map_err(|e| super::OtelError::SetGlobalDefault(e.to_string()))?;

        let provider = opentelemetry_sdk::trace::TracerProvider::builder().with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio).build();
        let tracer = provider.tracer("quadracode");

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_initialized() {
        // The first call here may or may not succeed depending on test
        // execution order across the crate; either way a second call must
        // report AlreadyInitialized since the static flag is set on entry.
        let _ = init_tracing();
        let second = init_tracing();
        assert!(matches!(second, Err(OtelError::AlreadyInitialized)));
    }
}
