// ============================================================
// Layer 2 — Stage 3: Training
// ============================================================
// Orchestrates the training stage in order:
//
//   Step 1: Load the updated base model  (Layer 6 - infra)
//   Step 2: Index the training directory (Layer 4 - data)
//   Step 3: Split 80/20 per class        (Layer 4 - data)
//   Step 4: Build train/valid streams    (Layer 4 - data)
//   Step 5: Run the two-phase fit        (Layer 5 - ml)
//   Step 6: Save the trained model, then byte-copy it to the
//           export path                  (Layer 6 - infra)
//
// Nothing is written until both phases finish; a failure in
// either phase leaves the previous artifacts untouched.
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::config::TrainingConfig;
use crate::data::{
    loader::ImageFolder,
    preprocessor::Preprocessor,
    splitter::{split_train_val, VALIDATION_SPLIT},
    stream::ImageStream,
};
use crate::domain::labels::ClassLabels;
use crate::infra::{
    checkpoint::{ModelManifest, ModelStore},
    metrics::MetricsLogger,
};
use crate::ml::{
    default_device,
    trainer::{Schedule, TrainOutcome, Trainer},
    TrainBackend,
};

pub struct TrainUseCase {
    config: TrainingConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        self.run::<TrainBackend>(&default_device())?;
        Ok(())
    }

    /// (training stream, validation stream, class labels of the directory)
    pub fn train_valid_generator(&self) -> Result<(ImageStream, ImageStream, ClassLabels)> {
        let cfg    = &self.config;
        let folder = ImageFolder::scan(&cfg.training_data)?;
        let labels = folder.labels();

        let (train, valid) = split_train_val(folder.samples, labels.len(), VALIDATION_SPLIT);
        tracing::info!(
            "{} training / {} validation images, batch size {}, augmentation={}",
            train.len(),
            valid.len(),
            cfg.batch_size,
            cfg.augmentation
        );

        let pre = Preprocessor::new(cfg.image_size);
        let n   = labels.len();
        Ok((
            ImageStream::training(train, pre, n, cfg.batch_size, cfg.seed, cfg.augmentation),
            ImageStream::validation(valid, pre, n, cfg.batch_size),
            labels,
        ))
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainOutcome<B>> {
        let cfg = &self.config;

        // ── Step 1: Updated base model ────────────────────────────────────────
        let (model, base) = ModelStore::load::<B>(&cfg.updated_base_model_path, device)?;
        if base.input_shape != cfg.image_size.as_array() {
            bail!(
                "Model input {:?} does not match IMAGE_SIZE {:?}; re-run the prepare stage",
                base.input_shape,
                cfg.image_size.as_array()
            );
        }
        if model.num_classes() != cfg.num_classes {
            bail!(
                "Model has {} outputs but CLASSES is {}; re-run the prepare stage",
                model.num_classes(),
                cfg.num_classes
            );
        }

        // ── Steps 2–4: Streams ────────────────────────────────────────────────
        let (train, valid, labels) = self.train_valid_generator()?;
        if labels.len() != model.num_classes() {
            bail!(
                "'{}' has {} classes but the model has {} outputs (CLASSES)",
                cfg.training_data.display(),
                labels.len(),
                model.num_classes()
            );
        }

        // ── Step 5: Fit ───────────────────────────────────────────────────────
        let logger  = MetricsLogger::new(&cfg.root_dir)?;
        let outcome = Trainer::<B>::new(&train, &valid, base.config.l2, device.clone())
            .with_metrics(&logger)
            .fit(model, &Schedule::from(cfg))?;

        // ── Step 6: Persist ───────────────────────────────────────────────────
        let manifest = ModelManifest::new(
            &base.architecture,
            base.config,
            labels,
            outcome.learning_rate,
            outcome.trainable.clone(),
        );
        ModelStore::save(&outcome.model, &manifest, &cfg.trained_model_path)?;
        ModelStore::copy(&cfg.trained_model_path, &cfg.model_export_path)?;

        tracing::info!(
            "Trained model saved to {} and {}",
            cfg.trained_model_path.display(),
            cfg.model_export_path.display()
        );
        Ok(outcome)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::prepare_use_case::PrepareBaseModelUseCase;
    use crate::config::{ImageSize, PrepareBaseModelConfig};
    use crate::infra::checkpoint::record_file;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};

    type AB = Autodiff<NdArray>;

    const CLASSES: [&str; 4] = [
        "adeno_carcinoma",
        "large_cell_carcinoma",
        "normal",
        "squamous_cell_carcinoma",
    ];

    pub(crate) fn write_tree(root: &Path, per_class: usize) {
        for (c, class) in CLASSES.iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let v = (c * 60 + i * 5) as u8;
                RgbImage::from_pixel(40, 40, Rgb([v, 255 - v, v / 2]))
                    .save(dir.join(format!("{i:02}.png")))
                    .unwrap();
            }
        }
    }

    fn prepare(root: &Path) -> PathBuf {
        let updated = root.join("base_model_updated");
        PrepareBaseModelUseCase::new(PrepareBaseModelConfig {
            base_model_type:         "vgg16".into(),
            root_dir:                root.to_path_buf(),
            base_model_path:         root.join("base_model"),
            updated_base_model_path: updated.clone(),
            image_size:              ImageSize::new(32, 32, 3),
            learning_rate:           1e-3,
            include_top:             false,
            weights:                 "none".into(),
            weights_file:            None,
            num_classes:             4,
            freeze_all:              true,
            freeze_till:             0,
        })
        .run::<NdArray>(&Default::default())
        .unwrap();
        updated
    }

    fn training_config(root: &Path, updated: PathBuf) -> TrainingConfig {
        TrainingConfig {
            root_dir:                root.join("training"),
            trained_model_path:      root.join("training").join("model"),
            model_export_path:       root.join("export").join("model"),
            updated_base_model_path: updated,
            training_data:           root.join("data"),
            batch_size:              2,
            augmentation:            false,
            image_size:              ImageSize::new(32, 32, 3),
            num_classes:             4,
            epochs_head:             1,
            epochs_fine:             0,
            lr_head:                 1e-3,
            lr_fine:                 1e-4,
            freeze_all:              true,
            freeze_till:             0,
            seed:                    42,
        }
    }

    #[test]
    fn test_generator_splits_per_class() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(&dir.path().join("data"), 5);
        let uc = TrainUseCase::new(training_config(dir.path(), dir.path().join("unused")));

        let (train, valid, labels) = uc.train_valid_generator().unwrap();
        assert_eq!(labels.label(0), "adeno_carcinoma");
        // floor(0.2 · 5) = 1 validation image per class
        assert_eq!(valid.len(), 4);
        assert_eq!(train.len(), 16);
        assert_eq!(train.steps_per_epoch(), 8);
        assert_eq!(valid.steps_per_epoch(), 2);
    }

    #[test]
    fn test_head_only_training_writes_identical_copies() {
        let dir     = tempfile::tempdir().unwrap();
        write_tree(&dir.path().join("data"), 5);
        let updated = prepare(dir.path());
        let cfg     = training_config(dir.path(), updated);

        let outcome = TrainUseCase::new(cfg.clone())
            .run::<AB>(&NdArrayDevice::default())
            .unwrap();
        assert_eq!(outcome.history.len(), 1);

        let trained  = std::fs::read(record_file(&cfg.trained_model_path)).unwrap();
        let exported = std::fs::read(record_file(&cfg.model_export_path)).unwrap();
        assert_eq!(trained, exported);

        let manifest = ModelStore::load_manifest(&cfg.model_export_path).unwrap();
        assert_eq!(manifest.labels.names().len(), 4);
        assert!(cfg.root_dir.join("metrics.csv").is_file());
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        for class in ["a", "b"] {
            std::fs::create_dir_all(data.join(class)).unwrap();
            RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(data.join(class).join("0.png")).unwrap();
        }
        let updated = prepare(dir.path());

        let err = TrainUseCase::new(training_config(dir.path(), updated))
            .run::<AB>(&NdArrayDevice::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("2 classes"));
    }

    #[test]
    fn test_model_outputs_must_match_classes_param() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(&dir.path().join("data"), 3);
        let updated = prepare(dir.path());

        let cfg = TrainingConfig { num_classes: 3, ..training_config(dir.path(), updated) };
        let err = TrainUseCase::new(cfg)
            .run::<AB>(&NdArrayDevice::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("CLASSES is 3"));
        assert!(!dir.path().join("training").join(crate::infra::metrics::METRICS_FILE).exists());
    }
}
