// ============================================================
// Layer 1 — Inference Service (HTTP)
// ============================================================
// axum router over one shared, read-only classifier:
//
//   AppState { classifier: Option<Arc<dyn ImageClassifier>>,
//              pipeline:   Pipeline }
//
// The classifier is loaded once before the listener binds.
// `None` only happens when the service was started with
// --allow-missing-model; /predict then answers 503.

pub mod handlers;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::application::pipeline::Pipeline;
use crate::domain::traits::ImageClassifier;

#[derive(Clone)]
pub struct AppState {
    pub classifier: Option<Arc<dyn ImageClassifier>>,
    pub pipeline:   Pipeline,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/train", post(handlers::train))
        .route("/predict", post(handlers::predict))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind {addr}"))?;
    tracing::info!(
        "Serving on http://{} (model loaded: {})",
        addr,
        state.classifier.is_some()
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
