pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod source;
pub mod state;

pub use config::{CliArgs, ServerConfig};
pub use error::{ApiError, ErrorCode};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use report::{ReportDocument, ReportError, ReportSummary, generate_report};
pub use server::build_router;
pub use shutdown::{ShutdownConfig, ShutdownCoordinator};
pub use source::{InMemoryRecordSource, RecordSource, SourceError};

use anyhow::Result;
use state::AppState;
use std::{future::IntoFuture, sync::Arc};
use tokio::net::TcpListener;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::from_config(config.clone())?);

    tracing::info!(
        data_file = ?config.data_file,
        source = state.source().name(),
        "starting customer call report service",
    );

    let coordinator = state.shutdown();
    let router = build_router(state);

    let listener = TcpListener::bind(config.http_bind_address).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(bind = %actual_addr, path = server::REPORT_PATH, "listening");

    let signal_coordinator = coordinator.clone();
    let server_future = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal_coordinator.wait_for_signal().await;
        })
        .into_future();

    let server_result = server_future.await;

    tracing::info!("server stopped accepting connections, draining");
    let phase = coordinator.drain().await;
    tracing::info!(%phase, "shutdown finished");

    server_result.map_err(anyhow::Error::from)
}
