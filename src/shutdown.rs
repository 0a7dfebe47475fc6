//! Graceful shutdown coordination
//!
//! On SIGINT or SIGTERM the HTTP server stops accepting connections, then the
//! coordinator waits for in-flight report requests to finish, up to a drain
//! timeout. Report generation itself is never interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests
    pub drain_timeout: Duration,
    /// Interval between in-flight checks while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ShutdownConfig {
    pub fn with_drain_timeout(mut self, timeout_secs: u64) -> Self {
        self.drain_timeout = Duration::from_secs(timeout_secs);
        self
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Complete,
    /// Drain timeout elapsed with requests still active
    Forced,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::Draining => write!(f, "draining"),
            ShutdownPhase::Complete => write!(f, "complete"),
            ShutdownPhase::Forced => write!(f, "forced"),
        }
    }
}

/// Coordinates graceful shutdown across the server
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    phase: RwLock<ShutdownPhase>,
    shutdown_token: CancellationToken,
    active_requests: Arc<AtomicU64>,
}

impl ShutdownCoordinator {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            phase: RwLock::new(ShutdownPhase::Running),
            shutdown_token: CancellationToken::new(),
            active_requests: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Token cancelled once shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn phase(&self) -> ShutdownPhase {
        *self.phase.read().await
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Marks a request as in flight until the returned guard is dropped
    pub fn track_request(&self) -> InFlightGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            active_requests: self.active_requests.clone(),
        }
    }

    pub fn active_request_count(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT), then cancel the token
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    warn!(%error, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C), initiating graceful shutdown");
            },
            _ = terminate => {
                info!("received SIGTERM, initiating graceful shutdown");
            },
            _ = self.shutdown_token.cancelled() => {
                info!("shutdown requested");
            },
        }
        self.shutdown_token.cancel();
    }

    /// Begin shutdown without waiting for a signal
    pub fn initiate(&self) {
        self.shutdown_token.cancel();
    }

    /// Wait for in-flight requests to finish, up to the drain timeout
    pub async fn drain(&self) -> ShutdownPhase {
        *self.phase.write().await = ShutdownPhase::Draining;
        let deadline = Instant::now() + self.config.drain_timeout;

        let outcome = loop {
            let active = self.active_request_count();
            if active == 0 {
                info!("all in-flight requests completed");
                break ShutdownPhase::Complete;
            }
            if Instant::now() >= deadline {
                warn!(
                    remaining_requests = active,
                    timeout_secs = self.config.drain_timeout.as_secs(),
                    "drain timeout reached with requests still active"
                );
                break ShutdownPhase::Forced;
            }
            debug!(active_requests = active, "waiting for requests to complete");
            sleep(self.config.poll_interval).await;
        };

        *self.phase.write().await = outcome;
        outcome
    }
}

/// Decrements the in-flight count when dropped
pub struct InFlightGuard {
    active_requests: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> ShutdownConfig {
        ShutdownConfig {
            drain_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn drain_completes_when_idle() {
        let coordinator = ShutdownCoordinator::new(quick_config());
        assert_eq!(coordinator.phase().await, ShutdownPhase::Running);
        assert_eq!(coordinator.drain().await, ShutdownPhase::Complete);
    }

    #[tokio::test]
    async fn drain_waits_for_guard_release() {
        let coordinator = Arc::new(ShutdownCoordinator::new(quick_config()));
        let guard = coordinator.track_request();
        assert_eq!(coordinator.active_request_count(), 1);

        let release = tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert_eq!(coordinator.drain().await, ShutdownPhase::Complete);
        release.await.unwrap();
        assert_eq!(coordinator.active_request_count(), 0);
    }

    #[tokio::test]
    async fn drain_gives_up_after_timeout() {
        let coordinator = ShutdownCoordinator::new(quick_config());
        let _guard = coordinator.track_request();
        assert_eq!(coordinator.drain().await, ShutdownPhase::Forced);
        assert_eq!(coordinator.phase().await, ShutdownPhase::Forced);
    }

    #[tokio::test]
    async fn initiate_releases_signal_waiters() {
        let coordinator = ShutdownCoordinator::new(quick_config());
        coordinator.initiate();
        coordinator.wait_for_signal().await;
        assert!(coordinator.is_shutdown_initiated());
    }
}
