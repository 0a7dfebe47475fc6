use crate::config::ServerConfig;
use crate::metrics::{METRICS, MetricsCollector};
use crate::shutdown::{ShutdownConfig, ShutdownCoordinator};
use crate::source::{InMemoryRecordSource, RecordSource};
use anyhow::Result;
use std::sync::Arc;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    config: Arc<ServerConfig>,
    source: Arc<dyn RecordSource>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, source: Arc<dyn RecordSource>) -> Self {
        let shutdown_config =
            ShutdownConfig::default().with_drain_timeout(config.graceful_shutdown_timeout_secs);
        Self {
            config,
            source,
            shutdown: Arc::new(ShutdownCoordinator::new(shutdown_config)),
            metrics: METRICS.clone(),
        }
    }

    /// Builds state backed by the configured data file, or an empty dataset
    /// when none is configured.
    pub fn from_config(config: Arc<ServerConfig>) -> Result<Self> {
        let source = match config.data_file.as_deref() {
            Some(path) => {
                let source = InMemoryRecordSource::from_path(path)?;
                tracing::info!(
                    path = %path.display(),
                    customers = source.customer_count(),
                    calls = source.call_count(),
                    "loaded record snapshot"
                );
                source
            }
            None => {
                tracing::warn!("no data file configured; serving an empty dataset");
                InMemoryRecordSource::default()
            }
        };
        Ok(Self::new(config, Arc::new(source)))
    }

    /// Replaces the metrics collector, mainly so tests can observe their own counters.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub fn source(&self) -> &dyn RecordSource {
        self.source.as_ref()
    }

    pub fn shutdown(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }
}
