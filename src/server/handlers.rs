// ============================================================
// Layer 1 — HTTP Handlers
// ============================================================
//   GET  /         → static HTML page
//   GET  /health   → {"status":"ok","model_loaded":bool}
//   POST /train    → runs the whole pipeline, plain-text reply
//   POST /predict  → {"image":"<base64>"} → [{"image":"<label>"}]
//
// Blocking work (the pipeline, a forward pass) runs on the
// blocking pool so the runtime threads stay free.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::application::predict_use_case::{Prediction, PredictUseCase};
use crate::server::AppState;

pub const TRAINING_DONE: &str = "Training done successfully!";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>CT-Scan Classifier</title>
</head>
<body>
  <h1>Chest CT-Scan Classifier</h1>
  <input type="file" id="scan" accept="image/*">
  <button onclick="predict()">Predict</button>
  <button onclick="train()">Train</button>
  <pre id="out"></pre>
  <script>
    const out = document.getElementById('out');
    async function predict() {
      const file = document.getElementById('scan').files[0];
      if (!file) { out.textContent = 'Choose an image first.'; return; }
      const data = await new Promise(r => {
        const fr = new FileReader();
        fr.onload = () => r(fr.result.split(',')[1]);
        fr.readAsDataURL(file);
      });
      const res = await fetch('/predict', {
        method: 'POST',
        headers: {'Content-Type': 'application/json'},
        body: JSON.stringify({image: data})
      });
      out.textContent = await res.text();
    }
    async function train() {
      out.textContent = 'Training...';
      const res = await fetch('/train', {method: 'POST'});
      out.textContent = await res.text();
    }
  </script>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status:       &'static str,
    pub model_loaded: bool,
}

/// Plain-text error reply.
#[derive(Debug)]
pub struct ApiError {
    status:  StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status:       "ok",
        model_loaded: state.classifier.is_some(),
    })
}

pub async fn train(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    let pipeline = state.pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.run_all())
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| ApiError::internal(format!("{e:#}")))?;
    Ok(TRAINING_DONE)
}

pub async fn predict(
    State(state): State<AppState>,
    Json(req):    Json<PredictRequest>,
) -> Result<Json<Vec<Prediction>>, ApiError> {
    let Some(classifier) = state.classifier.clone() else {
        return Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "No model loaded"));
    };

    let bytes = STANDARD
        .decode(req.image.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 payload: {e}")))?;

    image::guess_format(&bytes)
        .map_err(|e| ApiError::bad_request(format!("Undecodable image: {e}")))?;

    let predictions = tokio::task::spawn_blocking(move || {
        PredictUseCase::new(classifier).predict_bytes(&bytes)
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(|e| ApiError::internal(format!("{e:#}")))?;

    tracing::info!("Prediction: {:?}", predictions);
    Ok(Json(predictions))
}
