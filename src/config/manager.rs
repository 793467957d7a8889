// ============================================================
// Configuration Manager
// ============================================================
// Loads config.yaml + params.yaml once per process and derives
// one typed record per stage:
//
//   get_data_ingestion_config()     → Stage 1
//   get_prepare_base_model_config() → Stage 2
//   get_training_config()           → Stage 3
//   get_evaluation_config()         → Stage 4
//
// Each derivation is a pure function of the loaded documents
// plus directory creation, which is idempotent (mkdir -p).

use std::path::{Path, PathBuf};

use crate::config::entity::{
    DataIngestionConfig, EvaluationConfig, ImageSize, PrepareBaseModelConfig, TrainingConfig,
};
use crate::config::files::{flatten_yaml, read_yaml, ParamsFile, PipelineConfigFile};
use crate::error::{PipelineError, PipelineResult};
use crate::infra::files::create_directories;

pub const CONFIG_FILE_PATH: &str = "config/config.yaml";
pub const PARAMS_FILE_PATH: &str = "params.yaml";

/// Environment variable holding the experiment tracker URI.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

const TRAIN_SUBDIR: &str = "Train_and_Validation_Set";
const TEST_SUBDIR:  &str = "Test_Set";

#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config:     PipelineConfigFile,
    params:     ParamsFile,
    raw_params: serde_yaml::Value,
    image_size: ImageSize,
}

impl ConfigurationManager {
    /// Parse both files, validate hyperparameters, create `artifacts_root`.
    pub fn new(config_path: &Path, params_path: &Path) -> PipelineResult<Self> {
        let config: PipelineConfigFile = read_yaml(config_path)?;
        let params: ParamsFile         = read_yaml(params_path)?;
        let raw_params: serde_yaml::Value = read_yaml(params_path)?;

        let image_size = ImageSize::from_slice(&params.image_size)?;
        validate_params(&params)?;

        create_directories(&[&config.artifacts_root])?;

        Ok(Self { config, params, raw_params, image_size })
    }

    pub fn get_data_ingestion_config(&self) -> PipelineResult<DataIngestionConfig> {
        let c = &self.config.data_ingestion;
        create_directories(&[&c.root_dir])?;

        Ok(DataIngestionConfig {
            root_dir:        c.root_dir.clone(),
            source_url:      c.source_url.clone(),
            local_data_file: c.local_data_file.clone(),
            unzip_dir:       c.unzip_dir.clone(),
        })
    }

    pub fn get_prepare_base_model_config(&self) -> PipelineResult<PrepareBaseModelConfig> {
        let c = &self.config.prepare_base_model;
        let p = &self.params;
        create_directories(&[&c.root_dir])?;

        Ok(PrepareBaseModelConfig {
            base_model_type:         c.base_model_type.clone(),
            root_dir:                c.root_dir.clone(),
            base_model_path:         c.base_model_path.clone(),
            updated_base_model_path: c.updated_base_model_path.clone(),
            image_size:              self.image_size,
            learning_rate:           p.learning_rate_head,
            include_top:             p.include_top,
            weights:                 p.weights.clone(),
            weights_file:            p.weights_file.clone(),
            num_classes:             p.classes,
            freeze_all:              p.freeze_all,
            freeze_till:             p.freeze_till,
        })
    }

    pub fn get_training_config(&self) -> PipelineResult<TrainingConfig> {
        let t = &self.config.training;
        let p = &self.params;
        create_directories(&[&t.root_dir])?;

        Ok(TrainingConfig {
            root_dir:                t.root_dir.clone(),
            trained_model_path:      t.trained_model_path.clone(),
            model_export_path:       t.model_export_path.clone(),
            updated_base_model_path: self.config.prepare_base_model.updated_base_model_path.clone(),
            training_data:           self.dataset_dir(TRAIN_SUBDIR),
            batch_size:              p.batch_size,
            augmentation:            p.augmentation,
            image_size:              self.image_size,
            num_classes:             p.classes,
            epochs_head:             p.epochs_head,
            epochs_fine:             p.epochs_fine,
            lr_head:                 p.learning_rate_head,
            lr_fine:                 p.learning_rate_fine,
            freeze_all:              p.freeze_all,
            freeze_till:             p.freeze_till,
            seed:                    p.seed,
        })
    }

    /// Reads the tracking URI from the environment.
    pub fn get_evaluation_config(&self) -> PipelineResult<EvaluationConfig> {
        let uri = std::env::var(TRACKING_URI_ENV).ok().filter(|s| !s.trim().is_empty());
        self.evaluation_config_with_uri(uri)
    }

    pub fn evaluation_config_with_uri(
        &self,
        tracking_uri: Option<String>,
    ) -> PipelineResult<EvaluationConfig> {
        let e = &self.config.evaluation;
        create_directories(&[&e.root_dir])?;

        Ok(EvaluationConfig {
            model_path:            self.config.training.trained_model_path.clone(),
            test_data:             self.dataset_dir(TEST_SUBDIR),
            root_dir:              e.root_dir.clone(),
            score_file:            e.root_dir.join(&e.score_file),
            all_params:            flatten_yaml(&self.raw_params),
            tracking_uri,
            image_size:            self.image_size,
            batch_size:            self.params.batch_size,
            experiment_name:       self.config.mlflow.experiment_name.clone(),
            registered_model_name: self.config.mlflow.registered_model_name.clone(),
        })
    }

    /// Image size shared by every stage and the inference service.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn registered_model_name(&self) -> &str {
        &self.config.mlflow.registered_model_name
    }

    pub fn export_model_path(&self) -> &Path {
        &self.config.training.model_export_path
    }

    fn dataset_dir(&self, subset: &str) -> PathBuf {
        let d = &self.config.data_ingestion;
        d.unzip_dir.join(&d.source_dir_name).join(subset)
    }
}

fn validate_params(p: &ParamsFile) -> PipelineResult<()> {
    if p.batch_size == 0 {
        return Err(PipelineError::config("BATCH_SIZE must be > 0"));
    }
    if p.classes == 0 {
        return Err(PipelineError::config("CLASSES must be > 0"));
    }
    if !(p.learning_rate_head > 0.0) || !(p.learning_rate_fine > 0.0) {
        return Err(PipelineError::config("learning rates must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    pub(crate) const PARAMS_YAML: &str = "\
IMAGE_SIZE: [32, 32, 3]
BATCH_SIZE: 2
AUGMENTATION: false
INCLUDE_TOP: false
WEIGHTS: none
CLASSES: 4
FREEZE_ALL: true
FREEZE_TILL: 4
EPOCHS_HEAD: 1
EPOCHS_FINE: 0
LEARNING_RATE_HEAD: 0.001
LEARNING_RATE_FINE: 0.0001
";

    /// Write a config.yaml whose paths all live under `root`.
    pub(crate) fn write_config(root: &Path) -> (PathBuf, PathBuf) {
        let r = root.display();
        let config = format!(
            "\
artifacts_root: {r}/artifacts
data_ingestion:
  root_dir: {r}/artifacts/data_ingestion
  source_URL: https://drive.google.com/file/d/abc123/view?usp=sharing
  local_data_file: {r}/artifacts/data_ingestion/data.zip
  unzip_dir: {r}/artifacts/data_ingestion
  source_dir_name: ct_scans
prepare_base_model:
  root_dir: {r}/artifacts/prepare_base_model
  base_model_type: vgg16
  base_model_path: {r}/artifacts/prepare_base_model/base_model
  updated_base_model_path: {r}/artifacts/prepare_base_model/base_model_updated
training:
  root_dir: {r}/artifacts/training
  trained_model_path: {r}/artifacts/training/model
  model_export_path: {r}/model/model
evaluation:
  root_dir: {r}/artifacts/evaluation
  score_file: scores.json
mlflow:
  experiment_name: ct-scan-test
  registered_model_name: VGG16Model
"
        );
        let config_path = root.join("config.yaml");
        let params_path = root.join("params.yaml");
        fs::write(&config_path, config).unwrap();
        fs::write(&params_path, PARAMS_YAML).unwrap();
        (config_path, params_path)
    }

    #[test]
    fn test_loads_and_derives_stage_configs() {
        let dir = tempfile::tempdir().unwrap();
        let (config, params) = write_config(dir.path());
        let mgr = ConfigurationManager::new(&config, &params).unwrap();

        let ingest = mgr.get_data_ingestion_config().unwrap();
        assert_eq!(ingest.file_id().unwrap(), "abc123");
        assert!(ingest.root_dir.is_dir());

        let prep = mgr.get_prepare_base_model_config().unwrap();
        assert_eq!(prep.image_size, ImageSize::new(32, 32, 3));
        assert_eq!(prep.learning_rate, 0.001);
        assert!(prep.freeze_all);

        let train = mgr.get_training_config().unwrap();
        assert!(train.training_data.ends_with("ct_scans/Train_and_Validation_Set"));
        assert_eq!(train.updated_base_model_path, prep.updated_base_model_path);
        assert_eq!(train.seed, 42);

        let eval = mgr.evaluation_config_with_uri(None).unwrap();
        assert!(eval.test_data.ends_with("ct_scans/Test_Set"));
        assert_eq!(eval.model_path, train.trained_model_path);
        assert_eq!(eval.all_params["IMAGE_SIZE"], "[32, 32, 3]");
        assert!(eval.score_file.ends_with("evaluation/scores.json"));
    }

    #[test]
    fn test_directory_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (config, params) = write_config(dir.path());

        let first  = ConfigurationManager::new(&config, &params).unwrap();
        let second = ConfigurationManager::new(&config, &params).unwrap();
        first.get_training_config().unwrap();
        second.get_training_config().unwrap();
        first.get_training_config().unwrap();

        assert!(dir.path().join("artifacts/training").is_dir());
    }

    #[test]
    fn test_rejects_two_component_image_size() {
        let dir = tempfile::tempdir().unwrap();
        let (config, params) = write_config(dir.path());
        fs::write(&params, PARAMS_YAML.replace("[32, 32, 3]", "[32, 32]")).unwrap();

        let err = ConfigurationManager::new(&config, &params).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let (config, params) = write_config(dir.path());
        fs::write(&params, PARAMS_YAML.replace("BATCH_SIZE: 2", "BATCH_SIZE: 0")).unwrap();

        assert!(ConfigurationManager::new(&config, &params).is_err());
    }
}
