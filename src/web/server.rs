//! Web server implementation
//!
//! Wires the worker pool, coordinator, and stats collector into an axum
//! application, and runs it with graceful shutdown.

use axum::http::HeaderValue;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;
use uuid::Uuid;

use super::routes::{api_routes, root, AppState};
use crate::config::ServiceConfig;
use crate::coordinator::Coordinator;
use crate::stats::MetricsCollector;
use crate::worker::{PoolConfig, WorkerPool};

/// Transport slack above the service limit so the coordinator's own size
/// check produces the 413, not the body-limit middleware.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: "127.0.0.1".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}

/// Web server instance
pub struct WebServer {
    listen: ServerConfig,
    service: ServiceConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Assemble the service: worker pool, stats collector, coordinator.
    /// The pool is provisioned in [`run`](Self::run), not here.
    pub fn new(listen: ServerConfig, service: ServiceConfig) -> std::io::Result<Self> {
        let service = service.clamped();
        let pool = Arc::new(WorkerPool::new(PoolConfig::from_current_exe(
            service.worker_count,
        )?));
        let metrics = Arc::new(MetricsCollector::new());
        let coordinator = Coordinator::new(service.clone(), pool, metrics.clone());

        Ok(Self {
            listen,
            service,
            state: Arc::new(AppState::new(coordinator, metrics)),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.listen
    }

    /// Build the router
    fn build_router(&self) -> Router {
        let body_limit = self.service.max_file_size as usize + BODY_LIMIT_SLACK;
        Router::new()
            .route("/", get(root))
            .nest(&self.service.api_prefix, api_routes())
            .layer(middleware::from_fn(request_id))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .with_state(self.state.clone())
    }

    /// Run the server until SIGINT/SIGTERM, then drain the pool.
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.listen.socket_addr()?;
        let router = self.build_router();

        self.state.coordinator.pool().start().await?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            %addr,
            prefix = %self.service.api_prefix,
            workers = self.service.worker_count,
            "conversion service listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("draining worker pool");
        self.state
            .coordinator
            .pool()
            .shutdown(self.service.shutdown_grace())
            .await;
        Ok(())
    }
}

/// Tag every request with an `X-Request-ID` and carry it in the span.
async fn request_id(
    request: axum::extract::Request,
    next: middleware::Next,
) -> axum::response::Response {
    let id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %id, path = %request.uri().path());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
