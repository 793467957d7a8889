// ============================================================
// Error Taxonomy
// ============================================================
// Typed failures raised by the pipeline stages and the
// inference service. Use cases wrap these in anyhow::Error
// with context; callers that need to branch on the failure
// kind can downcast back to PipelineError.
//
// Every variant is fatal except where noted: the driver logs
// it and aborts the run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Config file missing, empty, malformed, or semantically invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stage 1: the source URL could not be resolved or fetched.
    #[error("Download failed: {0}")]
    Download(String),

    /// Stage 1: the downloaded archive could not be unpacked.
    #[error("Extraction of '{path}' failed: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// Stage 2: unknown backbone tag.
    #[error("Unsupported base model type: {0}")]
    UnsupportedArchitecture(String),

    /// No usable model could be loaded.
    #[error("Model could not be loaded: {0}")]
    ModelLoad(String),

    /// Stage 4: the experiment tracker rejected a request.
    #[error("Tracking error: {0}")]
    Tracking(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Extraction { path: path.into(), reason: reason.to_string() }
    }

    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
