//! Structured logging for the report service.
//!
//! Output format, destination and OTLP export are chosen from environment
//! variables at startup. Every HTTP request runs inside [`request_span`].

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry::trace::TraceError;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer};
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const SERVICE_NAME: &str = "crm-reports";
const QUIET_DEPENDENCIES: &str = "hyper=info,tower=info,umya_spreadsheet=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Files under [`LoggingConfig::log_dir`], optionally rotated daily
    File,
}

impl LogOutput {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stdout" => Some(LogOutput::Stdout),
            "stderr" => Some(LogOutput::Stderr),
            "file" => Some(LogOutput::File),
            _ => None,
        }
    }
}

/// Trace export to an OTLP collector.
#[derive(Debug, Clone, PartialEq)]
pub struct OtlpExport {
    pub endpoint: String,
    /// Fraction of root traces kept, clamped to 0.0..=1.0
    pub sampling_rate: f64,
    pub timeout: Duration,
}

impl OtlpExport {
    fn sampler(&self) -> Sampler {
        match self.sampling_rate {
            rate if rate >= 1.0 => Sampler::AlwaysOn,
            rate if rate <= 0.0 => Sampler::AlwaysOff,
            rate => Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    pub log_dir: PathBuf,
    pub rotate_daily: bool,
    /// Deployment environment, e.g. "development" or "production"
    pub environment: String,
    pub otlp: Option<OtlpExport>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl LoggingConfig {
    /// Reads `ENVIRONMENT`, `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR`,
    /// `LOG_ROTATION` and the `OTEL_*` exporter variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup; unknown or malformed
    /// values fall back to the defaults for the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("ENV"))
            .unwrap_or_else(|| "development".to_string());
        let production = is_production(&environment);

        let format = lookup("LOG_FORMAT")
            .and_then(|value| LogFormat::parse(&value))
            .unwrap_or(if production {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            });
        let output = lookup("LOG_OUTPUT")
            .and_then(|value| LogOutput::parse(&value))
            .unwrap_or(LogOutput::Stderr);

        let otlp = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").map(|endpoint| OtlpExport {
            endpoint,
            sampling_rate: lookup("OTEL_SAMPLING_RATE")
                .and_then(|rate| rate.parse::<f64>().ok())
                .map(|rate| rate.clamp(0.0, 1.0))
                .unwrap_or(if production { 0.1 } else { 1.0 }),
            timeout: Duration::from_secs(
                lookup("OTEL_EXPORTER_OTLP_TIMEOUT")
                    .and_then(|secs| secs.parse().ok())
                    .unwrap_or(10),
            ),
        });

        Self {
            format,
            output,
            log_dir: lookup("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            rotate_daily: lookup("LOG_ROTATION").is_none_or(|value| value != "never"),
            environment,
            otlp,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = if is_production(&self.environment) {
                "info"
            } else {
                "debug"
            };
            EnvFilter::new(format!("{level},{QUIET_DEPENDENCIES}"))
        })
    }

    fn writer(&self) -> Result<(NonBlocking, WorkerGuard)> {
        Ok(match self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File => {
                std::fs::create_dir_all(&self.log_dir).with_context(|| {
                    format!("failed to create log directory {:?}", self.log_dir)
                })?;
                let appender = if self.rotate_daily {
                    tracing_appender::rolling::daily(&self.log_dir, SERVICE_NAME)
                } else {
                    tracing_appender::rolling::never(&self.log_dir, SERVICE_NAME)
                };
                tracing_appender::non_blocking(appender)
            }
        })
    }

    fn resource(&self) -> Resource {
        use opentelemetry_semantic_conventions::resource;
        Resource::new([
            KeyValue::new(resource::SERVICE_NAME, SERVICE_NAME),
            KeyValue::new(resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ])
    }
}

fn is_production(environment: &str) -> bool {
    matches!(environment, "production" | "prod")
}

/// Installs the global subscriber. Hold the returned guard until exit so
/// buffered log lines are flushed.
pub fn init_logging(config: LoggingConfig) -> Result<WorkerGuard> {
    let (writer, guard) = config.writer()?;

    let otel_layer = config.otlp.as_ref().and_then(|otlp| {
        match build_tracer(otlp, config.resource()) {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(error) => {
                // The subscriber is not installed yet.
                eprintln!("OTLP export disabled, tracer setup failed: {error}");
                None
            }
        }
    });

    let fmt_layer: Box<dyn Layer<_> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(fmt_layer.with_filter(config.filter()))
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        environment = %config.environment,
        format = ?config.format,
        output = ?config.output,
        otlp = config.otlp.as_ref().map(|otlp| otlp.endpoint.as_str()),
        "logging initialized"
    );
    Ok(guard)
}

fn build_tracer(otlp: &OtlpExport, resource: Resource) -> Result<Tracer, TraceError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(otlp.endpoint.clone())
        .with_timeout(otlp.timeout);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(otlp.sampler())
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Flushes pending spans to the collector, if one is configured.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Span wrapping one HTTP request for a report.
pub fn request_span(route: &'static str) -> tracing::Span {
    tracing::info_span!(
        "report_request",
        http.route = route,
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn development_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.rotate_daily);
        assert!(config.otlp.is_none());
    }

    #[test]
    fn production_switches_to_json_and_sparse_sampling() {
        let config = LoggingConfig::from_lookup(lookup(&[
            ("ENVIRONMENT", "production"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        let otlp = config.otlp.unwrap();
        assert_eq!(otlp.sampling_rate, 0.1);
        assert_eq!(otlp.timeout, Duration::from_secs(10));
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = LoggingConfig::from_lookup(lookup(&[
            ("LOG_FORMAT", "xml"),
            ("LOG_OUTPUT", "FILE"),
            ("LOG_ROTATION", "never"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
            ("OTEL_SAMPLING_RATE", "7.5"),
        ]));
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::File);
        assert!(!config.rotate_daily);
        let otlp = config.otlp.unwrap();
        assert_eq!(otlp.sampling_rate, 1.0);
        assert!(matches!(otlp.sampler(), Sampler::AlwaysOn));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        unsafe {
            std::env::set_var("LOG_FORMAT", "json");
            std::env::set_var("LOG_OUTPUT", "stdout");
        }
        let config = LoggingConfig::from_env();
        unsafe {
            std::env::remove_var("LOG_FORMAT");
            std::env::remove_var("LOG_OUTPUT");
        }
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
    }
}
