// ============================================================
// Layer 2 — Pipeline Driver
// ============================================================
// Runs the four stages in order:
//
//   ingest → prepare → train → evaluate
//
// Each stage gets only its own config record and its own use
// case object. The first failure is logged with its full
// context chain and stops the run; later stages never start.

use anyhow::Result;
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::application::{
    evaluate_use_case::EvaluationUseCase,
    ingest_use_case::DataIngestionUseCase,
    prepare_use_case::PrepareBaseModelUseCase,
    train_use_case::TrainUseCase,
};
use crate::config::ConfigurationManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    Ingest,
    Prepare,
    Train,
    Evaluate,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Ingest, Stage::Prepare, Stage::Train, Stage::Evaluate];

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Ingest   => "Data Ingestion stage",
            Stage::Prepare  => "Prepare base model",
            Stage::Train    => "Training",
            Stage::Evaluate => "Evaluation stage",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config_path: PathBuf,
    params_path: PathBuf,
}

impl Pipeline {
    pub fn new(config_path: impl Into<PathBuf>, params_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            params_path: params_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn params_path(&self) -> &Path {
        &self.params_path
    }

    pub fn configuration(&self) -> Result<ConfigurationManager> {
        Ok(ConfigurationManager::new(&self.config_path, &self.params_path)?)
    }

    /// Run a single stage with its start/completion banners.
    pub fn run_stage(&self, stage: Stage) -> Result<()> {
        tracing::info!(">>>>>> stage {} started <<<<<<", stage);
        let result = self.dispatch(stage);
        match &result {
            Ok(())  => tracing::info!(">>>>>> stage {} completed <<<<<<\n\nx==========x", stage),
            Err(e)  => tracing::error!("{e:?}"),
        }
        result
    }

    /// Run all four stages, stopping at the first failure.
    pub fn run_all(&self) -> Result<()> {
        self.run_stages(&Stage::ALL)
    }

    pub fn run_stages(&self, stages: &[Stage]) -> Result<()> {
        for &stage in stages {
            self.run_stage(stage)?;
        }
        Ok(())
    }

    fn dispatch(&self, stage: Stage) -> Result<()> {
        let manager = self.configuration()?;
        match stage {
            Stage::Ingest   => DataIngestionUseCase::new(manager.get_data_ingestion_config()?).execute(),
            Stage::Prepare  => PrepareBaseModelUseCase::new(manager.get_prepare_base_model_config()?).execute(),
            Stage::Train    => TrainUseCase::new(manager.get_training_config()?).execute(),
            Stage::Evaluate => EvaluationUseCase::new(manager.get_evaluation_config()?).execute(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::manager::tests::write_config;
    use crate::error::PipelineError;

    #[test]
    fn test_stage_order_and_names() {
        assert_eq!(Stage::ALL.map(|s| s.display_name()), [
            "Data Ingestion stage",
            "Prepare base model",
            "Training",
            "Evaluation stage",
        ]);
        assert_eq!(Stage::from_str("evaluate", true).unwrap(), Stage::Evaluate);
    }

    #[test]
    fn test_missing_config_fails_with_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(dir.path().join("none.yaml"), dir.path().join("params.yaml"));
        let err = pipeline.run_all().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Config(_))));
    }

    #[test]
    fn test_failed_stage_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (config, params) = write_config(dir.path());
        let pipeline = Pipeline::new(config, params);

        // Nothing has been prepared, so training fails and
        // evaluation never writes its score file.
        assert!(pipeline.run_stages(&[Stage::Train, Stage::Evaluate]).is_err());
        assert!(!dir.path().join("artifacts/training/model.mpk.gz").exists());
        assert!(!dir.path().join("artifacts/evaluation/scores.json").exists());
    }
}
