//! Server lifecycle management
//!
//! Manages the startup and shutdown of all server components:
//! - connection hub
//! - HTTP/WebSocket server
//! - media relay keepalive and session cleanup

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use webmeet_core::{Config, SignalingHandler};
use webmeet_sfu::SignalingCoordinator;

/// `WebMeet` server - manages all server components
pub struct WebMeetServer {
    config: Config,
    coordinator: Option<Arc<SignalingCoordinator>>,
    shutdown: CancellationToken,
}

impl WebMeetServer {
    /// Create a new server instance
    pub fn new(config: Config, coordinator: Option<Arc<SignalingCoordinator>>) -> Self {
        Self {
            config,
            coordinator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start all components and wait for shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting WebMeet server...");

        let handler = self
            .coordinator
            .clone()
            .map(|coordinator| coordinator as Arc<dyn SignalingHandler>);
        let (hub, hub_handle) =
            webmeet_hub::spawn(&self.config.hub, handler, self.shutdown.child_token());
        info!("Connection hub started");

        let maintenance = self.start_maintenance();

        let router = webmeet_api::create_router(
            hub,
            self.coordinator.clone(),
            Arc::new(self.config.clone()),
        );
        let http_handle = self.start_http_server(router).await?;

        info!("All components started successfully");

        tokio::select! {
            _ = http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        self.shutdown.cancel();
        self.stop(hub_handle, maintenance).await;

        Ok(())
    }

    /// Wait for the hub to release every peer, then drop the gateway session
    async fn stop(&self, hub_handle: JoinHandle<()>, maintenance: Vec<JoinHandle<()>>) {
        info!("Shutting down WebMeet server...");

        // 1. The hub closes every peer queue and flushes pending leaves
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout_seconds);
        match tokio::time::timeout(timeout, hub_handle).await {
            Ok(Ok(())) => info!("Connection hub stopped"),
            Ok(Err(e)) => error!("Connection hub task failed: {}", e),
            Err(_) => warn!(
                "Connection hub did not stop within {}s, proceeding with shutdown",
                timeout.as_secs()
            ),
        }

        // 2. Background maintenance observes the same token
        for task in maintenance {
            let _ = task.await;
        }

        // 3. Release the gateway session
        if let Some(coordinator) = &self.coordinator {
            let client = coordinator.client();
            if let Some(session_id) = client.current_session().await {
                info!(session_id, "Destroying media relay session...");
                if let Err(e) = client.destroy_session(session_id).await {
                    warn!(session_id, error = %e, "Failed to destroy media relay session");
                }
            }
        }

        info!("WebMeet server shut down complete");
    }

    /// Keepalive and stale-session cleanup for the media relay
    fn start_maintenance(&self) -> Vec<JoinHandle<()>> {
        let Some(coordinator) = &self.coordinator else {
            return Vec::new();
        };

        let keepalive = {
            let coordinator = Arc::clone(coordinator);
            let shutdown = self.shutdown.clone();
            let period = self.config.janus.keepalive_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = coordinator.client().keepalive().await {
                                warn!(error = %e, "Media relay keepalive failed");
                            }
                        }
                    }
                }
                debug!("Keepalive task stopped");
            })
        };

        let cleanup = {
            let coordinator = Arc::clone(coordinator);
            let shutdown = self.shutdown.clone();
            let period = self.config.signaling.cleanup_interval();
            let max_age = self.config.signaling.session_max_age();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        _ = ticker.tick() => {
                            let removed = coordinator.cleanup(max_age).await;
                            if removed > 0 {
                                info!(removed, "Cleaned up stale room sessions");
                            }
                        }
                    }
                }
                debug!("Cleanup task stopped");
            })
        };

        info!("Media relay maintenance started");
        vec![keepalive, cleanup]
    }

    /// Start HTTP server
    async fn start_http_server(&self, router: axum::Router) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;

        info!("HTTP server listening on {}", http_address);

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
