use crate::shutdown::ShutdownPhase;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const SOURCE_COMPONENT: &str = "record_source";
const LIFECYCLE_COMPONENT: &str = "lifecycle";

/// Health status for a component or the overall system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but with partial failures
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Combines two health statuses, returning the worse of the two
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn healthy_with_details(component: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            error: None,
            timestamp: now(),
            details: Some(details),
        }
    }

    pub fn degraded_with_details(
        component: impl Into<String>,
        error: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            error: Some(error.into()),
            timestamp: now(),
            details: Some(details),
        }
    }

    pub fn unhealthy(component: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            timestamp: now(),
            details: None,
        }
    }
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: i64,
    pub version: String,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        (status, Json(self)).into_response()
    }
}

/// Readiness check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub status: HealthStatus,
    pub timestamp: i64,
    /// Components that are not ready
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub not_ready: Vec<String>,
}

impl IntoResponse for ReadinessResponse {
    fn into_response(self) -> Response {
        let status = if self.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}

/// Detailed component health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthResponse {
    pub status: HealthStatus,
    pub timestamp: i64,
    pub components: HashMap<String, ComponentHealth>,
}

impl IntoResponse for ComponentHealthResponse {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        (status, Json(self)).into_response()
    }
}

/// Runs liveness, readiness and per-component checks against shared state
#[derive(Clone)]
pub struct HealthChecker {
    state: Arc<AppState>,
}

impl HealthChecker {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Healthy whenever the process can answer
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            timestamp: now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Ready when the record source answers and shutdown has not begun
    pub async fn readiness(&self) -> ReadinessResponse {
        let components = self.check_all_components().await;
        let mut overall = HealthStatus::Healthy;
        let mut not_ready = Vec::new();

        for (name, health) in &components {
            overall = overall.combine(health.status);
            if health.status == HealthStatus::Unhealthy {
                not_ready.push(name.clone());
            }
        }
        not_ready.sort();

        ReadinessResponse {
            ready: overall != HealthStatus::Unhealthy,
            status: overall,
            timestamp: now(),
            not_ready,
        }
    }

    pub async fn components(&self) -> ComponentHealthResponse {
        let components = self.check_all_components().await;
        let overall = components
            .values()
            .fold(HealthStatus::Healthy, |acc, health| acc.combine(health.status));

        ComponentHealthResponse {
            status: overall,
            timestamp: now(),
            components,
        }
    }

    async fn check_all_components(&self) -> HashMap<String, ComponentHealth> {
        let mut components = HashMap::new();
        components.insert(SOURCE_COMPONENT.to_string(), self.check_record_source().await);
        components.insert(LIFECYCLE_COMPONENT.to_string(), self.check_lifecycle().await);
        components
    }

    async fn check_record_source(&self) -> ComponentHealth {
        let source = self.state.source();
        if let Err(error) = source.ping().await {
            return ComponentHealth::unhealthy(SOURCE_COMPONENT, error.to_string());
        }
        let details = serde_json::json!({ "kind": source.name(), "available": true });
        match self.state.config().data_file.as_deref() {
            Some(_) => ComponentHealth::healthy_with_details(SOURCE_COMPONENT, details),
            // Reachable, but every report will be empty.
            None => ComponentHealth::degraded_with_details(
                SOURCE_COMPONENT,
                "no data file configured",
                details,
            ),
        }
    }

    async fn check_lifecycle(&self) -> ComponentHealth {
        let shutdown = self.state.shutdown();
        let phase = shutdown.phase().await;
        if shutdown.is_shutdown_initiated() || phase != ShutdownPhase::Running {
            return ComponentHealth::unhealthy(
                LIFECYCLE_COMPONENT,
                format!("server is shutting down ({phase})"),
            );
        }
        ComponentHealth::healthy_with_details(
            LIFECYCLE_COMPONENT,
            serde_json::json!({
                "phase": phase.to_string(),
                "active_requests": shutdown.active_request_count(),
            }),
        )
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub async fn liveness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).liveness()
}

pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).readiness().await
}

pub async fn components_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).components().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::model::{Call, Customer, CustomerNo};
    use crate::source::{InMemoryRecordSource, RecordSource, SourceError};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl RecordSource for Offline {
        async fn customers(&self) -> Result<Vec<Customer>, SourceError> {
            Err(SourceError::Unavailable("offline".into()))
        }

        async fn calls_for_customer(&self, _: CustomerNo) -> Result<Vec<Call>, SourceError> {
            Err(SourceError::Unavailable("offline".into()))
        }

        async fn ping(&self) -> Result<(), SourceError> {
            Err(SourceError::Unavailable("offline".into()))
        }

        fn name(&self) -> &'static str {
            "offline"
        }
    }

    fn checker(source: Arc<dyn RecordSource>) -> HealthChecker {
        let state = AppState::new(Arc::new(ServerConfig::default()), source);
        HealthChecker::new(Arc::new(state))
    }

    #[test]
    fn health_status_combine() {
        assert_eq!(
            HealthStatus::Healthy.combine(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::Healthy.combine(HealthStatus::Healthy),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn ready_with_reachable_source() {
        let checker = checker(Arc::new(InMemoryRecordSource::default()));
        let readiness = checker.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.not_ready.is_empty());
    }

    #[tokio::test]
    async fn missing_data_file_degrades_but_stays_ready() {
        let checker = checker(Arc::new(InMemoryRecordSource::default()));
        let components = checker.components().await;
        assert_eq!(components.status, HealthStatus::Degraded);
        assert_eq!(components.status.status_code(), StatusCode::OK);
        let source = &components.components[SOURCE_COMPONENT];
        assert_eq!(source.status, HealthStatus::Degraded);
        assert_eq!(source.error.as_deref(), Some("no data file configured"));
        assert!(checker.readiness().await.ready);
    }

    #[tokio::test]
    async fn configured_data_file_is_healthy() {
        let config = ServerConfig {
            data_file: Some(std::path::PathBuf::from("fixtures/customers.yaml")),
            ..ServerConfig::default()
        };
        let state = AppState::new(Arc::new(config), Arc::new(InMemoryRecordSource::default()));
        let components = HealthChecker::new(Arc::new(state)).components().await;
        assert_eq!(components.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn not_ready_when_source_is_down() {
        let checker = checker(Arc::new(Offline));
        let readiness = checker.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.not_ready, vec![SOURCE_COMPONENT.to_string()]);
    }

    #[tokio::test]
    async fn not_ready_once_shutdown_starts() {
        let state = Arc::new(AppState::new(
            Arc::new(ServerConfig::default()),
            Arc::new(InMemoryRecordSource::default()),
        ));
        state.shutdown().initiate();
        let readiness = HealthChecker::new(state).readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.not_ready, vec![LIFECYCLE_COMPONENT.to_string()]);
    }
}
