use crate::error::ApiError;
use crate::health;
use crate::logging::request_span;
use crate::metrics::ReportMetrics;
use crate::report::{self, ReportDocument};
use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tracing::Instrument;

pub const REPORT_PATH: &str = "/reports/customer-calls";
/// Route kept for clients of the older CRM web front end.
pub const LEGACY_REPORT_PATH: &str = "/Report/GenerateReport";

/// Builds the HTTP router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(REPORT_PATH, get(generate_report_handler))
        .route(LEGACY_REPORT_PATH, get(legacy_report_handler))
        .route("/health", get(health::liveness_handler))
        .route("/ready", get(health::readiness_handler))
        .route("/health/components", get(health::components_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

pub async fn generate_report_handler(State(state): State<Arc<AppState>>) -> Response {
    serve_report(state, REPORT_PATH)
        .instrument(request_span(REPORT_PATH))
        .await
}

pub async fn legacy_report_handler(State(state): State<Arc<AppState>>) -> Response {
    serve_report(state, LEGACY_REPORT_PATH)
        .instrument(request_span(LEGACY_REPORT_PATH))
        .await
}

async fn serve_report(state: Arc<AppState>, route: &'static str) -> Response {
    let _in_flight = state.shutdown().track_request();
    let metrics = ReportMetrics::with_collector(state.metrics());

    match report::generate_report(state.source()).await {
        Ok(document) => {
            metrics.success(&document.summary, document.bytes.len());
            tracing::info!(
                route,
                bytes = document.bytes.len(),
                rows = document.summary.rows,
                "report delivered"
            );
            attachment(document)
        }
        Err(error) => {
            metrics.error(error.category());
            let api_error = ApiError::from(&error);
            tracing::error!(
                route,
                error_id = %api_error.error_id,
                category = error.category(),
                error = %error,
                "report generation failed"
            );
            api_error.into_response()
        }
    }
}

fn attachment(document: ReportDocument) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    let mut response = (StatusCode::OK, document.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(document.content_type),
    );
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(error) => tracing::warn!(%error, "invalid content-disposition header"),
    }
    response
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        state.metrics().encode(),
    )
}
