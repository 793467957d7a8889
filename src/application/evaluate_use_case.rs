// ============================================================
// Layer 2 — Stage 4: Evaluation
// ============================================================
//   Step 1: Load the trained model + manifest
//   Step 2: Stream every test image in sorted order
//           (no shuffle, no augmentation, partial batch kept)
//   Step 3: Score → flat JSON map + confusion-matrix PNG
//   Step 4: Record one tracking run (params, metrics, plot,
//           score file, model files); register the model only
//           when the backend has a registry
//
// Labels in the score map are the class names of the test
// directory.

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::EvaluationConfig;
use crate::data::{loader::ImageFolder, preprocessor::Preprocessor, stream::ImageStream};
use crate::domain::{
    labels::ClassLabels,
    report::ConfusionMatrix,
    traits::{ExperimentTracker, RunStatus},
};
use crate::infra::{
    checkpoint::ModelStore,
    files::save_json,
    plot::save_confusion_matrix,
    tracking::tracker_for_uri,
};
use crate::ml::{
    default_device,
    evaluator::{evaluate, Evaluation},
    InnerBackend,
};

pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix_Test_Data.png";

/// Artifact directory the model files are logged under.
const MODEL_ARTIFACT_DIR: &str = "model";

/// Result of `evaluation()`, consumed by the score and tracking steps.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub evaluation: Evaluation,
    pub labels:     ClassLabels,
    pub scores:     BTreeMap<String, f64>,
}

impl EvaluationOutcome {
    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        self.evaluation.confusion_matrix(self.labels.len())
    }
}

pub struct EvaluationUseCase {
    config: EvaluationConfig,
}

impl EvaluationUseCase {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let outcome = self.evaluation::<InnerBackend>(&default_device())?;
        self.save_score(&outcome)?;
        self.log_into_mlflow(&outcome)?;
        Ok(())
    }

    pub fn confusion_matrix_path(&self) -> PathBuf {
        self.config.root_dir.join(CONFUSION_MATRIX_FILE)
    }

    pub fn evaluation<B: Backend>(&self, device: &B::Device) -> Result<EvaluationOutcome> {
        let cfg = &self.config;

        let (model, manifest) = ModelStore::load::<B>(&cfg.model_path, device)?;
        let folder = ImageFolder::scan(&cfg.test_data)?;
        let labels = folder.labels();
        if labels.len() != model.num_classes() {
            bail!(
                "'{}' has {} classes but the model has {} outputs",
                cfg.test_data.display(),
                labels.len(),
                model.num_classes()
            );
        }

        let stream = ImageStream::evaluation(
            folder.samples,
            Preprocessor::new(cfg.image_size),
            labels.len(),
            cfg.batch_size,
        );
        tracing::info!(
            "Evaluating {} on {} test images ({} batches)",
            cfg.model_path.display(),
            stream.len(),
            stream.steps_per_epoch()
        );

        let evaluation = evaluate(&model, &stream, manifest.config.l2, device)?;
        let scores     = evaluation.scores(&labels);
        Ok(EvaluationOutcome { evaluation, labels, scores })
    }

    /// Write the score map as sorted JSON and render the confusion matrix.
    pub fn save_score(&self, outcome: &EvaluationOutcome) -> Result<()> {
        save_json(&self.config.score_file, &outcome.scores)?;
        save_confusion_matrix(&outcome.confusion_matrix(), &self.confusion_matrix_path())?;
        tracing::info!(
            "Scores saved to {} (loss={:.4}, accuracy={:.4})",
            self.config.score_file.display(),
            outcome.evaluation.loss,
            outcome.evaluation.accuracy
        );
        Ok(())
    }

    pub fn log_into_mlflow(&self, outcome: &EvaluationOutcome) -> Result<()> {
        let mut tracker = tracker_for_uri(self.config.tracking_uri.as_deref())?;
        self.log_into(tracker.as_mut(), outcome)
    }

    /// One run: params, metrics, artifacts, optional registration.
    /// A run whose logging fails is closed as FAILED.
    pub fn log_into(&self, tracker: &mut dyn ExperimentTracker, outcome: &EvaluationOutcome) -> Result<()> {
        let cfg = &self.config;
        tracker.start_run(&cfg.experiment_name)?;

        match self.log_run(tracker, outcome) {
            Ok(()) => tracker.end_run(RunStatus::Finished),
            Err(e) => {
                if let Err(end) = tracker.end_run(RunStatus::Failed) {
                    tracing::warn!("Could not mark run failed: {end:#}");
                }
                Err(e)
            }
        }
    }

    fn log_run(&self, tracker: &mut dyn ExperimentTracker, outcome: &EvaluationOutcome) -> Result<()> {
        let cfg = &self.config;
        tracker.log_params(&cfg.all_params)?;
        tracker.log_metrics(&outcome.scores)?;

        tracker.log_artifact(&self.confusion_matrix_path(), "")?;
        tracker.log_artifact(&cfg.score_file, "")?;
        for file in ModelStore::files(&cfg.model_path) {
            tracker
                .log_artifact(&file, MODEL_ARTIFACT_DIR)
                .with_context(|| format!("Cannot log model file '{}'", file.display()))?;
        }

        if tracker.supports_registry() {
            let version = tracker.register_model(MODEL_ARTIFACT_DIR, &cfg.registered_model_name)?;
            tracing::info!("Registered '{}' version {}", cfg.registered_model_name, version);
        } else {
            tracing::info!("Tracking backend has no model registry; skipping registration");
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSize;
    use crate::infra::checkpoint::ModelManifest;
    use crate::infra::tracking::FileTracker;
    use crate::ml::backbone::Vgg16Config;
    use crate::ml::model::ClassifierConfig;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    /// Records calls instead of writing anything.
    #[derive(Default)]
    struct RecordingTracker {
        calls:    Vec<String>,
        registry: bool,
    }

    impl ExperimentTracker for RecordingTracker {
        fn start_run(&mut self, name: &str) -> Result<()> {
            self.calls.push(format!("start:{name}"));
            Ok(())
        }
        fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
            self.calls.push(format!("params:{}", params.len()));
            Ok(())
        }
        fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
            self.calls.push(format!("metrics:{}", metrics.len()));
            Ok(())
        }
        fn log_artifact(&mut self, file: &Path, dir: &str) -> Result<()> {
            let name = file.file_name().unwrap().to_string_lossy();
            self.calls.push(format!("artifact:{dir}/{name}"));
            Ok(())
        }
        fn supports_registry(&self) -> bool {
            self.registry
        }
        fn register_model(&mut self, dir: &str, name: &str) -> Result<String> {
            self.calls.push(format!("register:{dir}:{name}"));
            Ok("1".into())
        }
        fn end_run(&mut self, status: RunStatus) -> Result<()> {
            self.calls.push(format!("end:{}", status.as_str()));
            Ok(())
        }
    }

    fn setup(root: &Path) -> EvaluationConfig {
        let test_data = root.join("Test_Set");
        for (c, class) in ["adeno_carcinoma", "large_cell_carcinoma", "normal", "squamous_cell_carcinoma"]
            .iter()
            .enumerate()
        {
            let dir = test_data.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                RgbImage::from_pixel(36, 36, Rgb([(c * 60) as u8, i as u8 * 90, 10]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let model_path = root.join("model");
        let cfg        = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), 4);
        let manifest   = ModelManifest::new("vgg16", cfg.clone(), ClassLabels::lung_ct(), 1e-3, vec![]);
        ModelStore::save(&cfg.init::<NdArray>(&Default::default()), &manifest, &model_path).unwrap();

        let eval_dir = root.join("evaluation");
        std::fs::create_dir_all(&eval_dir).unwrap();
        EvaluationConfig {
            model_path,
            test_data,
            root_dir:              eval_dir.clone(),
            score_file:            eval_dir.join("scores.json"),
            all_params:            BTreeMap::from([("BATCH_SIZE".to_string(), "3".to_string())]),
            tracking_uri:          None,
            image_size:            ImageSize::new(32, 32, 3),
            batch_size:            3,
            experiment_name:       "ct-scan".into(),
            registered_model_name: "VGG16Model".into(),
        }
    }

    #[test]
    fn test_evaluation_covers_every_test_image_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let uc  = EvaluationUseCase::new(setup(dir.path()));
        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();

        assert_eq!(out.evaluation.y_true, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(out.evaluation.y_pred.len(), 8);
        assert_eq!(out.confusion_matrix().total(), 8);
        assert!(out.scores.contains_key("normal_precision"));
        assert!(out.scores.contains_key("macro_f1-score"));
    }

    #[test]
    fn test_score_file_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = setup(dir.path());
        let uc  = EvaluationUseCase::new(cfg.clone());

        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        uc.save_score(&out).unwrap();
        let first = std::fs::read(&cfg.score_file).unwrap();

        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        uc.save_score(&out).unwrap();
        assert_eq!(first, std::fs::read(&cfg.score_file).unwrap());
        assert!(uc.confusion_matrix_path().is_file());
    }

    #[test]
    fn test_local_tracker_skips_registration() {
        let dir = tempfile::tempdir().unwrap();
        let uc  = EvaluationUseCase::new(setup(dir.path()));
        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        uc.save_score(&out).unwrap();

        let mut tracker = RecordingTracker::default();
        uc.log_into(&mut tracker, &out).unwrap();
        assert_eq!(tracker.calls.first().unwrap(), "start:ct-scan");
        assert_eq!(tracker.calls.last().unwrap(), "end:FINISHED");
        assert!(tracker.calls.contains(&"artifact:model/model.mpk.gz".to_string()));
        assert!(tracker.calls.contains(&"artifact:model/model.json".to_string()));
        assert!(!tracker.calls.iter().any(|c| c.starts_with("register")));
    }

    #[test]
    fn test_remote_tracker_registers_model() {
        let dir = tempfile::tempdir().unwrap();
        let uc  = EvaluationUseCase::new(setup(dir.path()));
        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        uc.save_score(&out).unwrap();

        let mut tracker = RecordingTracker { registry: true, ..Default::default() };
        uc.log_into(&mut tracker, &out).unwrap();
        assert!(tracker.calls.contains(&"register:model:VGG16Model".to_string()));
        assert_eq!(tracker.calls.last().unwrap(), "end:FINISHED");
    }

    #[test]
    fn test_file_store_run_gets_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let uc  = EvaluationUseCase::new(setup(dir.path()));
        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        uc.save_score(&out).unwrap();

        let mut tracker = FileTracker::new(dir.path().join("mlruns"));
        uc.log_into(&mut tracker, &out).unwrap();
        assert!(dir.path().join("mlruns").is_dir());
    }

    #[test]
    fn test_failed_logging_closes_run_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = setup(dir.path());
        let uc  = EvaluationUseCase::new(cfg.clone());
        let out = uc.evaluation::<NdArray>(&Default::default()).unwrap();
        // score file and plot were never saved, so artifact logging fails

        let mut tracker = FileTracker::new(dir.path().join("mlruns"));
        assert!(uc.log_into(&mut tracker, &out).is_err());

        let experiment = std::fs::read_dir(dir.path().join("mlruns"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.is_dir())
            .unwrap();
        let run_dir = std::fs::read_dir(&experiment)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.is_dir())
            .unwrap();
        let meta = std::fs::read_to_string(run_dir.join("meta.yaml")).unwrap();
        assert!(meta.contains(&format!("status: {}", RunStatus::Failed.code())));
    }
}
