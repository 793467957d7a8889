// ============================================================
// Local File Tracker
// ============================================================
// Writes runs in the same on-disk layout as MLflow's local
// file store, so `mlflow ui --backend-store-uri ./mlruns` can
// browse them:
//
//   mlruns/
//     <experiment_id>/
//       meta.yaml
//       <run_id>/
//         meta.yaml
//         params/<key>          ← value
//         metrics/<key>         ← "<timestamp_ms> <value> <step>"
//         artifacts/<dir>/<file>
//
// There is no registry here: register_model is refused.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::traits::{ExperimentTracker, RunStatus};
use crate::error::PipelineError;

const RUN_STATUS_RUNNING: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    experiment_id:     String,
    lifecycle_stage:   String,
    name:              String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri:    String,
    experiment_id:   String,
    lifecycle_stage: String,
    run_id:          String,
    run_name:        String,
    status:          u8,
    start_time:      u64,
    end_time:        Option<u64>,
}

#[derive(Debug)]
struct ActiveRun {
    dir:  PathBuf,
    meta: RunMeta,
}

pub struct FileTracker {
    root: PathBuf,
    run:  Option<ActiveRun>,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), run: None }
    }

    /// Directory of the open run, if any.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run.as_ref().map(|r| r.dir.as_path())
    }

    fn active(&self) -> Result<&ActiveRun> {
        match &self.run {
            Some(run) => Ok(run),
            None => bail!(PipelineError::tracking("no active run; call start_run first")),
        }
    }

    /// Find an experiment by name, or create it with the next free id.
    fn ensure_experiment(&self, name: &str) -> Result<String> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Cannot create tracking store '{}'", self.root.display()))?;

        let mut max_id: i64 = 0;
        for entry in fs::read_dir(&self.root)? {
            let meta_path = entry?.path().join("meta.yaml");
            let Ok(text) = fs::read_to_string(&meta_path) else { continue };
            let Ok(meta) = serde_yaml::from_str::<ExperimentMeta>(&text) else { continue };

            if meta.name == name && meta.lifecycle_stage == "active" {
                return Ok(meta.experiment_id);
            }
            if let Ok(id) = meta.experiment_id.parse::<i64>() {
                max_id = max_id.max(id);
            }
        }

        let id  = (max_id + 1).to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir)?;
        let meta = ExperimentMeta {
            artifact_location: dir.display().to_string(),
            experiment_id:     id.clone(),
            lifecycle_stage:   "active".to_string(),
            name:              name.to_string(),
        };
        fs::write(dir.join("meta.yaml"), serde_yaml::to_string(&meta)?)?;
        tracing::info!("Created experiment '{}' with id {}", name, id);
        Ok(id)
    }

    fn write_run_meta(run: &ActiveRun) -> Result<()> {
        fs::write(run.dir.join("meta.yaml"), serde_yaml::to_string(&run.meta)?)?;
        Ok(())
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn new_run_id() -> String {
    let mut rng = rand::thread_rng();
    (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

/// Keys become file names; keep them to one path component.
fn sanitize_key(key: &str) -> String {
    key.replace(['/', '\\'], "_")
}

impl ExperimentTracker for FileTracker {
    fn start_run(&mut self, experiment_name: &str) -> Result<()> {
        let experiment_id = self.ensure_experiment(experiment_name)?;
        let run_id = new_run_id();
        let dir    = self.root.join(&experiment_id).join(&run_id);

        for sub in ["params", "metrics", "artifacts", "tags"] {
            fs::create_dir_all(dir.join(sub))?;
        }

        let run = ActiveRun {
            meta: RunMeta {
                artifact_uri:    dir.join("artifacts").display().to_string(),
                experiment_id,
                lifecycle_stage: "active".to_string(),
                run_id:          run_id.clone(),
                run_name:        format!("evaluation-{}", &run_id[..8]),
                status:          RUN_STATUS_RUNNING,
                start_time:      now_millis(),
                end_time:        None,
            },
            dir,
        };
        Self::write_run_meta(&run)?;
        tracing::info!("Started run {} in {}", run_id, run.dir.display());
        self.run = Some(run);
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let dir = self.active()?.dir.join("params");
        for (key, value) in params {
            fs::write(dir.join(sanitize_key(key)), value)?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let dir = self.active()?.dir.join("metrics");
        let ts  = now_millis();
        for (key, value) in metrics {
            fs::write(dir.join(sanitize_key(key)), format!("{ts} {value} 0\n"))?;
        }
        Ok(())
    }

    fn log_artifact(&mut self, file: &Path, artifact_dir: &str) -> Result<()> {
        let dest_dir = self.active()?.dir.join("artifacts").join(artifact_dir);
        fs::create_dir_all(&dest_dir)?;

        let name = file
            .file_name()
            .with_context(|| format!("'{}' has no file name", file.display()))?;
        fs::copy(file, dest_dir.join(name))
            .with_context(|| format!("Cannot log artifact '{}'", file.display()))?;
        Ok(())
    }

    fn supports_registry(&self) -> bool {
        false
    }

    fn register_model(&mut self, _artifact_dir: &str, model_name: &str) -> Result<String> {
        bail!(PipelineError::tracking(format!(
            "the local file store has no model registry (model '{model_name}')"
        )))
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let Some(mut run) = self.run.take() else {
            bail!(PipelineError::tracking("no active run to end"));
        };
        run.meta.status   = status.code();
        run.meta.end_time = Some(now_millis());
        Self::write_run_meta(&run)?;
        tracing::info!("Ended run {} ({})", run.meta.run_id, status.as_str());
        Ok(())
    }
}
