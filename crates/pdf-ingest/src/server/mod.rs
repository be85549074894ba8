//! HTTP server for the ingestion queue

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::service::IngestService;
use state::AppState;

/// Ingestion HTTP server
pub struct IngestServer {
    config: IngestConfig,
    state: AppState,
}

impl IngestServer {
    /// Open the task store from `config` and start the queue
    pub fn new(config: IngestConfig) -> Result<Self> {
        let service = IngestService::open(&config)?;
        Ok(Self::with_service(config, service))
    }

    /// Serve an already composed service
    pub fn with_service(config: IngestConfig, service: IngestService) -> Self {
        let state = AppState::new(config.clone(), service);
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes(self.config.server.max_upload_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.router();

        tracing::info!("Starting ingestion server on http://{}", addr);
        tracing::info!("API documentation: http://{}/api/info", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check: 200 when the store is reachable and workers make progress
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.service().is_healthy() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received; interrupted tasks resume on next start");
}

#[cfg(test)]
pub(crate) mod test_client {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::IngestServer;
    use crate::config::IngestConfig;
    use crate::ingestion::Extractor;
    use crate::processing::EngineOptions;
    use crate::service::IngestService;
    use crate::storage::JsonTaskStore;

    /// Router over a fresh store in `dir`
    pub fn router(dir: &Path, extractor: Arc<dyn Extractor>) -> (axum::Router, IngestService) {
        let mut config = IngestConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        let uploads = config.storage.upload_path();
        std::fs::create_dir_all(&uploads).unwrap();

        let store = Arc::new(JsonTaskStore::open(config.storage.db_path()).unwrap());
        let service =
            IngestService::new(store, extractor, EngineOptions::from_config(&config), uploads)
                .unwrap();
        let server = IngestServer::with_service(config, service.clone());
        (server.router(), service)
    }

    /// Send one request, returning status and parsed JSON body
    pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// JSON request helper
    pub async fn api(
        router: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        send(router, builder.body(body).unwrap()).await
    }
}
