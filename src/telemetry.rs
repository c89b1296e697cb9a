//! Logging, metrics export and trace export for the `suns` binary.
//!
//! Log lines always go to stderr: stdout carries the JSON results of the
//! CLI commands. Prometheus and OTLP export are compiled in only with the
//! `prometheus` and `otel` features.

#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, TelemetryConfig};

/// Boxed error returned by telemetry setup.
pub type TelemetryError = Box<dyn std::error::Error + Send + Sync>;

/// Keeps exporters alive; flushes pending spans when dropped.
#[must_use = "dropping the guard flushes and stops trace export"]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("suns: failed to flush traces: {e}");
            }
        }
    }
}

/// Install the global subscriber and any configured exporters.
///
/// `RUST_LOG` takes precedence over `log_level`.
pub fn init(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let stderr = match config.log_format {
        LogFormat::Full => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    };
    let registry = tracing_subscriber::registry().with(stderr).with(filter);

    #[cfg(feature = "otel")]
    let guard = {
        use opentelemetry::trace::TracerProvider;

        let provider = config.opentelemetry.as_ref().map(tracer_provider).transpose()?;
        let otel = provider
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("suns")));
        registry.with(otel).try_init()?;
        TelemetryGuard { provider }
    };
    #[cfg(not(feature = "otel"))]
    let guard = {
        registry.try_init()?;
        TelemetryGuard {}
    };

    info!(level = %config.log_level, format = ?config.log_format, "logging initialized");

    #[cfg(feature = "prometheus")]
    if let Some(addr) = config.prometheus_addr {
        start_prometheus_exporter(addr)?;
    }

    Ok(guard)
}

#[cfg(feature = "otel")]
fn tracer_provider(
    otel: &crate::config::OpenTelemetryConfig,
) -> Result<opentelemetry_sdk::trace::SdkTracerProvider, TelemetryError> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otel.endpoint)
        .build()?;
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_attributes([
                    KeyValue::new(SERVICE_NAME, otel.service_name.clone()),
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                ])
                .build(),
        )
        .build();
    Ok(provider)
}

/// Serve Prometheus metrics over HTTP and describe the `suns.` metrics.
#[cfg(feature = "prometheus")]
fn start_prometheus_exporter(addr: SocketAddr) -> Result<(), TelemetryError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    crate::metrics::describe();
    info!(%addr, "serving Prometheus metrics");
    Ok(())
}
