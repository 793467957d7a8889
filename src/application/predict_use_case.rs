// ============================================================
// Layer 2 — Prediction
// ============================================================
// Wraps one loaded ImageClassifier for the CLI and the HTTP
// service. The model is resolved once:
//
//   ModelSource::Path      → <path>.mpk.gz + <path>.json
//   ModelSource::Registry  → latest "Production" version of the
//                            registered model, downloaded from a
//                            remote tracking server
//
// Image bytes only ever travel through call parameters.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::traits::ImageClassifier;
use crate::error::PipelineError;
use crate::infra::checkpoint::MANIFEST_EXTENSION;
use crate::infra::tracking::{mlflow::fetch_registered_model, MlflowClient, TrackingBackend};
use crate::ml::{default_device, inferencer::Inferencer, InnerBackend};

pub const PRODUCTION_STAGE: &str = "Production";

/// One entry of the `/predict` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub image: String,
}

// ─── Model source ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub enum ModelSource {
    Path(PathBuf),
    Registry {
        tracking_uri: Option<String>,
        model_name:   String,
        stage:        String,
        cache_dir:    PathBuf,
    },
}

impl ModelSource {
    pub fn load(&self) -> Result<Arc<dyn ImageClassifier>> {
        let path = match self {
            Self::Path(path) => path.clone(),
            Self::Registry { tracking_uri, model_name, stage, cache_dir } => {
                fetch_from_registry(tracking_uri.as_deref(), model_name, stage, cache_dir)?
            }
        };

        let inferencer = Inferencer::<InnerBackend>::from_path(&path, default_device())
            .with_context(|| format!("Cannot load model from '{}'", path.display()))?;
        tracing::info!(
            "Loaded model {} with labels {:?}",
            path.display(),
            inferencer.labels().names()
        );
        Ok(Arc::new(inferencer))
    }
}

/// Download the registered model and return the path stem of its manifest.
fn fetch_from_registry(
    tracking_uri: Option<&str>,
    model_name:   &str,
    stage:        &str,
    cache_dir:    &Path,
) -> Result<PathBuf> {
    let TrackingBackend::Remote(base) = TrackingBackend::from_uri(tracking_uri)? else {
        return Err(PipelineError::model_load(
            "loading from the model registry needs an http(s) tracking URI",
        )
        .into());
    };

    let client = MlflowClient::new(&base)?;
    let files  = fetch_registered_model(&client, model_name, stage, cache_dir)?;
    let manifest = files
        .iter()
        .find(|f| f.extension().is_some_and(|e| e == MANIFEST_EXTENSION))
        .ok_or_else(|| {
            PipelineError::model_load(format!(
                "registered model '{model_name}' ({stage}) has no .{MANIFEST_EXTENSION} manifest"
            ))
        })?;
    Ok(manifest.with_extension(""))
}

// ─── Use case ─────────────────────────────────────────────────────────────────
pub struct PredictUseCase {
    classifier: Arc<dyn ImageClassifier>,
}

impl PredictUseCase {
    pub fn new(classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { classifier }
    }

    pub fn from_source(source: &ModelSource) -> Result<Self> {
        Ok(Self::new(source.load()?))
    }

    pub fn predict_bytes(&self, image: &[u8]) -> Result<Vec<Prediction>> {
        let label = self.classifier.classify(image)?;
        Ok(vec![Prediction { image: label }])
    }

    pub fn predict_file(&self, path: &Path) -> Result<Vec<Prediction>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read image '{}'", path.display()))?;
        self.predict_bytes(&bytes)
    }
}
