use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use catalog_cache::Coordinator;
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Coordinator>,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::live))
        .route("/health/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::debug!(elapsed_ms = %latency.as_millis(), "request handled");
                    },
                ),
        )
        .with_state(state)
}

pub struct CatalogServer {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    cache: Arc<Coordinator>,
    app: Router,
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Connect the cache and assemble the router.
    ///
    /// Only invalid local cache settings fail here; an unreachable Redis
    /// leaves the cache in local-only mode.
    pub async fn build(self) -> anyhow::Result<CatalogServer> {
        let cache = Arc::new(Coordinator::connect(self.config.cache.clone()).await?);
        tracing::info!(mode = ?cache.mode(), "Cache coordinator ready");

        let app = build_app(AppState {
            cache: cache.clone(),
        });

        Ok(CatalogServer {
            addr: self.config.addr(),
            shutdown_timeout: Duration::from_secs(self.config.server.shutdown_timeout_secs),
            cache,
            app,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let serve = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future();
        let result = tokio::select! {
            result = serve => result.map_err(anyhow::Error::from),
            _ = drain_deadline(self.shutdown_timeout) => {
                tracing::warn!("graceful shutdown timed out, dropping open connections");
                Ok(())
            }
        };

        self.cache.close();
        result
    }
}

/// Resolves `timeout` after the shutdown signal; pending forever before it.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
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
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
