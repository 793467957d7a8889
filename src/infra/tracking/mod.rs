// ============================================================
// Layer 6 — Experiment Tracking
// ============================================================
// Picks an ExperimentTracker from the tracking URI:
//
//   (unset)             → FileTracker at ./mlruns
//   file:///abs/path    → FileTracker at /abs/path
//   file:rel/path       → FileTracker at rel/path
//   some/plain/path     → FileTracker at that path
//   http(s)://host:port → MlflowTracker (REST)
//
// Anything else is a ConfigError. Only the remote backend has
// a model registry; the evaluate stage asks the tracker
// whether to register instead of re-parsing the scheme.

pub mod file_store;
pub mod mlflow;

use std::path::PathBuf;

use crate::domain::traits::ExperimentTracker;
use crate::error::{PipelineError, PipelineResult};

pub use file_store::FileTracker;
pub use mlflow::{MlflowClient, MlflowTracker};

pub const DEFAULT_FILE_STORE: &str = "mlruns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingBackend {
    File(PathBuf),
    Remote(String),
}

impl TrackingBackend {
    pub fn from_uri(uri: Option<&str>) -> PipelineResult<Self> {
        let Some(uri) = uri.map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(Self::File(PathBuf::from(DEFAULT_FILE_STORE)));
        };

        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(Self::Remote(uri.trim_end_matches('/').to_string()));
        }
        if let Some(rest) = uri.strip_prefix("file://") {
            return Ok(Self::File(PathBuf::from(rest)));
        }
        if let Some(rest) = uri.strip_prefix("file:") {
            return Ok(Self::File(PathBuf::from(rest)));
        }

        match uri.split_once("://") {
            Some((scheme, _)) => Err(PipelineError::config(format!(
                "unsupported tracking URI scheme '{scheme}' in '{uri}'"
            ))),
            None => Ok(Self::File(PathBuf::from(uri))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Build the tracker for `uri`.
pub fn tracker_for_uri(uri: Option<&str>) -> PipelineResult<Box<dyn ExperimentTracker>> {
    let tracker: Box<dyn ExperimentTracker> = match TrackingBackend::from_uri(uri)? {
        TrackingBackend::File(root) => {
            tracing::info!("Tracking runs in local store {}", root.display());
            Box::new(FileTracker::new(root))
        }
        TrackingBackend::Remote(base) => {
            tracing::info!("Tracking runs on MLflow server {}", base);
            Box::new(MlflowTracker::new(MlflowClient::new(&base)?))
        }
    };
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_uri_is_local_mlruns() {
        assert_eq!(
            TrackingBackend::from_uri(None).unwrap(),
            TrackingBackend::File(PathBuf::from("mlruns"))
        );
        assert_eq!(
            TrackingBackend::from_uri(Some("  ")).unwrap(),
            TrackingBackend::File(PathBuf::from("mlruns"))
        );
    }

    #[test]
    fn test_file_schemes_and_plain_paths() {
        assert_eq!(
            TrackingBackend::from_uri(Some("file:///tmp/runs")).unwrap(),
            TrackingBackend::File(PathBuf::from("/tmp/runs"))
        );
        assert_eq!(
            TrackingBackend::from_uri(Some("file:runs")).unwrap(),
            TrackingBackend::File(PathBuf::from("runs"))
        );
        assert_eq!(
            TrackingBackend::from_uri(Some("./my_runs")).unwrap(),
            TrackingBackend::File(PathBuf::from("./my_runs"))
        );
    }

    #[test]
    fn test_http_is_remote_without_trailing_slash() {
        let backend = TrackingBackend::from_uri(Some("https://dagshub.com/u/repo.mlflow/")).unwrap();
        assert!(backend.is_remote());
        assert_eq!(backend, TrackingBackend::Remote("https://dagshub.com/u/repo.mlflow".into()));
    }

    #[test]
    fn test_unknown_scheme_is_config_error() {
        let err = TrackingBackend::from_uri(Some("s3://bucket/runs")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_only_remote_tracker_has_registry() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().display().to_string();
        assert!(!tracker_for_uri(Some(&uri)).unwrap().supports_registry());
        assert!(tracker_for_uri(Some("http://127.0.0.1:5000")).unwrap().supports_registry());
    }
}
