//! HTTP server implementation using Axum.

use crate::handlers::http::{
    handle_connect, handle_disconnect, handle_shutdown, handle_status, handle_toggle,
};
use crate::handlers::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use cookie_core::ControlService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// How long in-flight requests get to finish once the server is told to stop.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Application state shared across handlers.
pub struct AppState {
    pub service: ControlService,
}

/// Handle to the running HTTP server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting requests and wait (bounded) for in-flight ones.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_DRAIN, &mut self.task).await.is_err() {
            warn!("HTTP server did not drain in time; aborting");
            self.task.abort();
        }
    }
}

/// Build the router: the query routes, the JSON-RPC bridge and `/health`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .route("/status", get(handle_status))
        .route("/toggle", get(handle_toggle).post(handle_toggle))
        .route("/connect", get(handle_connect).post(handle_connect))
        .route("/disconnect", get(handle_disconnect).post(handle_disconnect))
        .route("/shutdown", get(handle_shutdown).post(handle_shutdown))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// The returned handle carries the bound address (useful when port=0).
pub async fn start_server(
    service: ControlService,
    host: &str,
    port: u16,
) -> anyhow::Result<ServerHandle> {
    let app = router(Arc::new(AppState { service }));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = served {
            error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        addr: actual_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
