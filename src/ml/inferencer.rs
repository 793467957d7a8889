// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Holds one loaded model for the lifetime of the process and
// labels single images:
//
//   bytes → decode → RGB → resize (H, W) → ÷255 → [1, 3, H, W]
//         → forward → softmax → arg-max → label table
//
// The label table and input size come from the model's
// manifest. An index outside the table maps to "Unknown".
//
// Burn modules are Send but not Sync, so the model sits behind
// a Mutex; each request only borrows it for one forward pass.

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::TensorData};
use std::path::Path;
use std::sync::Mutex;

use crate::data::preprocessor::Preprocessor;
use crate::domain::{labels::ClassLabels, traits::ImageClassifier};
use crate::error::PipelineResult;
use crate::infra::checkpoint::{ModelManifest, ModelStore};
use crate::config::ImageSize;
use crate::ml::model::{predicted_classes, CtScanClassifier};
use crate::ml::InnerBackend;

pub struct Inferencer<B: Backend = InnerBackend> {
    model:        Mutex<CtScanClassifier<B>>,
    preprocessor: Preprocessor,
    labels:       ClassLabels,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    /// Load `<path>.mpk.gz` + `<path>.json`.
    pub fn from_path(path: &Path, device: B::Device) -> PipelineResult<Self> {
        let (model, manifest) = ModelStore::load::<B>(path, &device)?;
        Ok(Self::new(model, &manifest, device))
    }

    pub fn new(model: CtScanClassifier<B>, manifest: &ModelManifest, device: B::Device) -> Self {
        let [height, width, channels] = manifest.input_shape;
        Self {
            model:        Mutex::new(model),
            preprocessor: Preprocessor::new(ImageSize::new(height, width, channels)),
            labels:       manifest.labels.clone(),
            device,
        }
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Class index for one encoded image.
    pub fn predict_index(&self, image: &[u8]) -> Result<usize> {
        let size   = self.preprocessor.image_size();
        let pixels = self.preprocessor.tensor_data_from_bytes(image)?;
        let input  = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [1, 3, size.height, size.width]),
            &self.device,
        );

        let model = self.model.lock().map_err(|_| anyhow!("Model lock poisoned"))?;
        let probs = model.probabilities(input);
        predicted_classes(probs)?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Model returned no prediction"))
    }
}

impl<B: Backend> ImageClassifier for Inferencer<B> {
    fn classify(&self, image: &[u8]) -> Result<String> {
        let index = self.predict_index(image)?;
        let label = self.labels.label(index).to_string();
        tracing::debug!("Predicted class {} → {}", index, label);
        Ok(label)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backbone::{Vgg16Config, FEATURE_LAYERS};
    use crate::ml::model::{ClassifierConfig, FreezePolicy};
    use burn::backend::NdArray;
    use burn::module::Param;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::from_pixel(w, h, Rgb([90, 120, 30]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn inferencer(labels: ClassLabels, num_classes: usize) -> Inferencer<NdArray> {
        let cfg      = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), num_classes);
        let device   = Default::default();
        let model    = cfg.init::<NdArray>(&device);
        let manifest = ModelManifest::new("vgg16", cfg, labels, 1e-3, FreezePolicy::All.flags(FEATURE_LAYERS));
        Inferencer::new(model, &manifest, device)
    }

    #[test]
    fn test_any_image_size_gives_a_known_label() {
        let inf   = inferencer(ClassLabels::lung_ct(), 4);
        let label = inf.classify(&png(50, 70)).unwrap();
        assert!(ClassLabels::lung_ct().names().contains(&label));
    }

    #[test]
    fn test_index_outside_table_is_unknown() {
        // six outputs, four labels; zero weights leave the bias to pick index 5
        let cfg       = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), 6);
        let device    = Default::default();
        let mut model = cfg.init::<NdArray>(&device);
        model.head.output.weight = Param::from_tensor(Tensor::zeros([cfg.hidden_units, 6], &device));
        model.head.output.bias   = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(vec![0.0f32, 0.0, 0.0, 0.0, 0.0, 5.0], [6]),
            &device,
        )));
        let manifest = ModelManifest::new("vgg16", cfg, ClassLabels::lung_ct(), 1e-3, vec![]);
        let inf      = Inferencer::new(model, &manifest, device);

        assert_eq!(inf.predict_index(&png(32, 32)).unwrap(), 5);
        assert_eq!(inf.classify(&png(32, 32)).unwrap(), "Unknown");
    }

    #[test]
    fn test_undecodable_payload_is_an_error() {
        let inf = inferencer(ClassLabels::lung_ct(), 4);
        assert!(inf.classify(b"not an image").is_err());
    }

    #[test]
    fn test_loads_from_saved_model() {
        let dir      = tempfile::tempdir().unwrap();
        let cfg      = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), 4);
        let manifest = ModelManifest::new("vgg16", cfg.clone(), ClassLabels::lung_ct(), 1e-3, vec![]);
        let path     = dir.path().join("model");
        ModelStore::save(&cfg.init::<NdArray>(&Default::default()), &manifest, &path).unwrap();

        let inf = Inferencer::<NdArray>::from_path(&path, Default::default()).unwrap();
        assert_eq!(inf.labels(), &ClassLabels::lung_ct());
    }
}
