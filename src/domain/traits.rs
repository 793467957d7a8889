// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams where the pipeline talks to something it
// should not know the concrete type of:
//
//   ImageClassifier   — anything that turns image bytes into
//                       a label (the loaded burn model, or a
//                       stub in server tests)
//   ExperimentTracker — anything that records a run (local
//                       ./mlruns store, or a remote MLflow
//                       server over REST)
//
// Both are object-safe so callers can hold Box<dyn …> /
// Arc<dyn …> and pick the implementation at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

// ─── ImageClassifier ──────────────────────────────────────────────────────────
/// A loaded, read-only model that labels a single image.
///
/// Implementations:
///   - Inferencer → burn model + label table from the manifest
pub trait ImageClassifier: Send + Sync {
    /// Classify one encoded image (PNG, JPEG, …).
    /// Returns the label, or "Unknown" for an out-of-table index.
    fn classify(&self, image: &[u8]) -> Result<String>;
}

// ─── RunStatus ────────────────────────────────────────────────────────────────
/// Terminal state of a tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    /// Name used by the MLflow REST API.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed   => "FAILED",
        }
    }

    /// Numeric code stored in an mlruns `meta.yaml`.
    pub fn code(self) -> u8 {
        match self {
            RunStatus::Finished => 3,
            RunStatus::Failed   => 4,
        }
    }
}

// ─── ExperimentTracker ────────────────────────────────────────────────────────
/// Records one evaluation run.
///
/// Call order: `start_run` → any number of `log_*` → optional
/// `register_model` → `end_run`.
///
/// Implementations:
///   - FileTracker   → writes ./mlruns on the local filesystem
///   - MlflowTracker → MLflow REST API over HTTP
pub trait ExperimentTracker {
    /// Ensure the experiment exists (create if absent) and open a run in it.
    fn start_run(&mut self, experiment_name: &str) -> Result<()>;

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()>;

    /// Upload a single file under `artifact_dir` (relative, "" for root).
    fn log_artifact(&mut self, file: &Path, artifact_dir: &str) -> Result<()>;

    /// Whether this backend has a model registry.
    fn supports_registry(&self) -> bool;

    /// Register the artifacts under `artifact_dir` as a new version of
    /// `model_name`. Returns the version string.
    fn register_model(&mut self, artifact_dir: &str, model_name: &str) -> Result<String>;

    /// Close the open run with `status`.
    fn end_run(&mut self, status: RunStatus) -> Result<()>;
}
