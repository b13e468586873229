//! HTTP server for the document pipeline

pub mod routes;
pub mod state;
pub mod stream;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::Result;
use state::AppState;

/// Pipeline HTTP server
pub struct PipelineServer {
    config: AppConfig,
    state: AppState,
}

impl PipelineServer {
    pub fn new(config: AppConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Build the router with all routes
    fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health_check))
            .nest("/api", api_routes(self.config.server.max_upload_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Bind and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| crate::error::Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting pipeline server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| crate::error::Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Build all API routes
fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Submission - with larger body limit for file uploads
        .route(
            "/pipelines",
            post(routes::pipelines::create)
                .get(routes::pipelines::list)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/pipelines/:id", get(routes::pipelines::get))
        // Live progress
        .route("/pipelines/:id/stream", get(routes::pipelines::get_stream))
        // Key-authenticated processing
        .route(
            "/process",
            post(routes::process::create).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Collections
        .route("/collections", get(routes::collections::list))
        .route("/collections/:name", get(routes::collections::get))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
