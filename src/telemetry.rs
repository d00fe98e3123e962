//! Telemetry and logging infrastructure
//!
//! - Console logging (human-readable, verbose only)
//! - JSON file logging (daily rolling, for analysis)
//! - OpenTelemetry export (Jaeger, Honeycomb, etc.) when an endpoint is set
//! - Run reports: one JSON file per finished run under `<log_dir>/runs`

use crate::crew::RunOutcome;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const SERVICE_NAME: &str = "autocrew";
const LOG_FILE: &str = "autocrew.log";
const RUNS_DIR: &str = "runs";

/// Logging handle. Keep it alive for the whole process; dropping it flushes
/// the file writer and the span exporter.
pub struct Telemetry {
    session_id: Uuid,
    log_dir: PathBuf,
    _file_guard: Option<WorkerGuard>,
    otel_provider: Option<SdkTracerProvider>,
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info,h2=info,rustls=info,handlebars=info")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn,handlebars=warn")
        }
    })
}

impl Telemetry {
    /// Install the global subscriber. A second call in the same process keeps
    /// the first subscriber.
    pub fn init(log_dir: PathBuf, verbose: bool, otel_endpoint: Option<&str>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;
        let session_id = Uuid::new_v4();

        let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = fmt::layer().json().with_writer(non_blocking);
        let console_layer = verbose.then(|| fmt::layer().with_target(false).compact());

        let otel_provider = match otel_endpoint {
            Some(endpoint) => {
                let exporter = opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                    .build()?;

                Some(
                    SdkTracerProvider::builder()
                        .with_batch_exporter(exporter)
                        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                        .build(),
                )
            }
            None => None,
        };
        let otel_layer = otel_provider
            .as_ref()
            .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME)));

        tracing_subscriber::registry()
            .with(env_filter(verbose))
            .with(console_layer)
            .with(file_layer)
            .with(otel_layer)
            .try_init()
            .ok();

        tracing::info!(
            session_id = %session_id,
            log_dir = %log_dir.display(),
            otel_enabled = otel_endpoint.is_some(),
            "Telemetry initialized"
        );

        Ok(Self {
            session_id,
            log_dir,
            _file_guard: Some(file_guard),
            otel_provider,
        })
    }

    /// No subscriber, only the log dir (for tests)
    pub fn minimal(log_dir: PathBuf) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            log_dir,
            _file_guard: None,
            otel_provider: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Write `outcome` to `<log_dir>/runs/<run_id>.json`
    pub fn save_outcome(&self, outcome: &RunOutcome) -> anyhow::Result<PathBuf> {
        let dir = self.log_dir.join(RUNS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", outcome.run_id));
        std::fs::write(&path, outcome.to_json())?;

        tracing::debug!(run_id = %outcome.run_id, path = %path.display(), "run report saved");
        Ok(path)
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.otel_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to flush OpenTelemetry spans: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("session_id", &self.session_id)
            .field("log_dir", &self.log_dir)
            .field("otel_enabled", &self.otel_provider.is_some())
            .finish()
    }
}
