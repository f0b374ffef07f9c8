//! Bridge server lifecycle management.
//!
//! [`BridgeServer::bind`] opens both listeners up front so bind failures
//! surface before anything is spawned; [`BridgeServer::serve`] then runs
//! the device accept loop and the Axum server until the shutdown future
//! resolves, and clears the shared state on the way out.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::device::serve_devices;
use crate::router::build_router;
use crate::state::BridgeState;

/// Errors that can occur when starting or running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// A bridge with both listeners bound, ready to serve.
#[derive(Debug)]
pub struct BridgeServer {
    device_listener: TcpListener,
    ws_listener: TcpListener,
    device_addr: SocketAddr,
    ws_addr: SocketAddr,
    static_dir: Option<PathBuf>,
    state: Arc<BridgeState>,
}

impl BridgeServer {
    /// Bind the device and `WebSocket` listeners.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if either address cannot be bound.
    pub async fn bind(config: &ServerConfig, state: Arc<BridgeState>) -> Result<Self, ServerError> {
        let (device_listener, device_addr) = bind(&config.device_addr()).await?;
        let (ws_listener, ws_addr) = bind(&config.ws_addr()).await?;

        Ok(Self {
            device_listener,
            ws_listener,
            device_addr,
            ws_addr,
            static_dir: config.static_dir.clone(),
            state,
        })
    }

    /// Address the device listener is bound to.
    pub const fn device_addr(&self) -> SocketAddr {
        self.device_addr
    }

    /// Address the `WebSocket` listener is bound to.
    pub const fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if the HTTP server fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            device_listener,
            ws_listener,
            device_addr,
            ws_addr,
            static_dir,
            state,
        } = self;

        info!(addr = %device_addr, "TCP server listening for traffic controller");
        let device_task = tokio::spawn(serve_devices(device_listener, Arc::clone(&state)));

        info!(addr = %ws_addr, "WebSocket server listening for dashboard clients");
        let router = build_router(Arc::clone(&state), static_dir.as_deref());
        let result = axum::serve(ws_listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(format!("serve error: {e}")));

        info!("Shutting down bridge");
        device_task.abort();
        state.shutdown().await;

        result
    }
}

/// Bind and serve until `Ctrl-C`.
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn start_server(config: &ServerConfig, state: Arc<BridgeState>) -> Result<(), ServerError> {
    BridgeServer::bind(config, state).await?.serve(ctrl_c()).await
}

async fn bind(addr: &str) -> Result<(TcpListener, SocketAddr), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address for {addr}: {e}")))?;
    Ok((listener, local))
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
