//! Logging and OpenTelemetry tracing
//!
//! Console logs always go through a fmt layer (plain or JSON lines). When
//! an OTLP endpoint is configured, spans are also exported to a collector:
//!
//! ```text
//! orderpilot → OTLP (gRPC) → OTel Collector → Tempo / Jaeger
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,orderpilot=debug";

/// Initialize the tracing subsystem
///
/// Logs go to stderr so stdout stays free for notifications.
///
/// # Arguments
/// * `service_name` - Name for the service in traces
/// * `otlp_endpoint` - OTLP collector URL; no export when None
/// * `json` - Emit logs as JSON lines instead of human-readable text
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    match otlp_endpoint {
        Some(endpoint) => tracing::info!(service = service_name, endpoint, "OpenTelemetry tracing initialized"),
        None => tracing::debug!(service = service_name, "Tracing initialized without OTLP export"),
    }

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::debug!("OpenTelemetry tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
