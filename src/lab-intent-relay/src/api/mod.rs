//! HTTP surface of the relay.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::IntentService;

pub mod error;
pub mod routes;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IntentService>,
}

impl AppState {
    pub fn new(service: Arc<IntentService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let intents = Router::new()
        .route("/actions/prepare", post(routes::prepare_action))
        .route("/reservations/prepare", post(routes::prepare_reservation))
        .route("/register", post(routes::register));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/intents", intents)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);

    info!("Starting intent relay on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
