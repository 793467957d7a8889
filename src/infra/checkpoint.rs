// ============================================================
// Layer 6 — Model Store
// ============================================================
// Saves and restores models using Burn's CompactRecorder.
//
// What gets saved per model path `<p>`:
//   1. <p>.mpk.gz  — all learned parameters
//   2. <p>.json    — the ModelManifest
//
// Why save a manifest next to the weights?
//   Loading needs the exact architecture (input size,
//   include_top, head width, class count) to rebuild the
//   model before the weights go into it, and inference needs
//   the class label table to turn an index into a name.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Compresses with gzip for smaller file size
//   - Type-safe: loading fails if architecture doesn't match
//   - Appends its own extension to the path it is given, so
//     every path goes through `record_stem` first
//
// File layout after a full run:
//   artifacts/prepare_base_model/
//     base_model.mpk.gz           ← raw VGG16
//     base_model.json             ← Vgg16Config
//     base_model_updated.mpk.gz   ← backbone + head
//     base_model_updated.json     ← ModelManifest
//   artifacts/training/
//     model.mpk.gz / model.json   ← trained model
//   model/
//     model.mpk.gz / model.json   ← byte copy for export
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::CompactRecorder,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::labels::ClassLabels;
use crate::error::{PipelineError, PipelineResult};
use crate::infra::files::{create_directories, save_json};
use crate::ml::backbone::{Vgg16, Vgg16Config};
use crate::ml::model::{ClassifierConfig, CtScanClassifier};

pub const RECORD_EXTENSION:   &str = "mpk.gz";
pub const MANIFEST_EXTENSION: &str = "json";

pub const OPTIMIZER: &str = "adam";
pub const LOSS:      &str = "categorical_crossentropy";

/// `path` with any trailing `.mpk.gz` removed.
pub fn record_stem(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_suffix(".mpk.gz") {
        Some(stem) => PathBuf::from(stem),
        None       => path.to_path_buf(),
    }
}

/// The weights file the recorder reads and writes for `path`.
pub fn record_file(path: &Path) -> PathBuf {
    record_stem(path).with_extension(RECORD_EXTENSION)
}

pub fn manifest_file(path: &Path) -> PathBuf {
    record_stem(path).with_extension(MANIFEST_EXTENSION)
}

// ─── Manifest ─────────────────────────────────────────────────────────────────
/// Everything needed to rebuild and use a saved classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub architecture:  String,
    pub config:        ClassifierConfig,
    /// (H, W, C)
    pub input_shape:   [usize; 3],
    pub labels:        ClassLabels,
    pub optimizer:     String,
    pub learning_rate: f64,
    pub loss:          String,
    /// One flag per backbone layer, in layer-table order.
    pub trainable:     Vec<bool>,
}

impl ModelManifest {
    pub fn new(
        architecture:  &str,
        config:        ClassifierConfig,
        labels:        ClassLabels,
        learning_rate: f64,
        trainable:     Vec<bool>,
    ) -> Self {
        Self {
            architecture: architecture.to_lowercase(),
            input_shape:  config.backbone.input_shape(),
            config,
            labels,
            optimizer: OPTIMIZER.to_string(),
            learning_rate,
            loss: LOSS.to_string(),
            trainable,
        }
    }

    pub fn num_trainable_layers(&self) -> usize {
        self.trainable.iter().filter(|t| **t).count()
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────
/// Stateless save/load helpers over a model path.
pub struct ModelStore;

impl ModelStore {
    /// Save the unmodified backbone and its config.
    pub fn save_backbone<B: Backend>(
        model: &Vgg16<B>,
        cfg:   &Vgg16Config,
        path:  &Path,
    ) -> Result<()> {
        ensure_parent(path)?;
        model
            .clone()
            .save_file(record_stem(path), &CompactRecorder::new())
            .with_context(|| format!("Failed to save backbone to '{}'", record_file(path).display()))?;
        cfg.save(manifest_file(path))
            .with_context(|| format!("Cannot write '{}'", manifest_file(path).display()))?;

        tracing::debug!("Saved backbone: {}", record_file(path).display());
        Ok(())
    }

    /// Save classifier weights and manifest.
    pub fn save<B: Backend>(
        model:    &CtScanClassifier<B>,
        manifest: &ModelManifest,
        path:     &Path,
    ) -> Result<()> {
        ensure_parent(path)?;
        model
            .clone()
            .save_file(record_stem(path), &CompactRecorder::new())
            .with_context(|| format!("Failed to save model to '{}'", record_file(path).display()))?;
        save_json(&manifest_file(path), manifest)?;

        tracing::debug!("Saved model: {}", record_file(path).display());
        Ok(())
    }

    pub fn load_manifest(path: &Path) -> PipelineResult<ModelManifest> {
        let file = manifest_file(path);
        let json = fs::read_to_string(&file).map_err(|e| {
            PipelineError::model_load(format!("cannot read manifest '{}': {e}", file.display()))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            PipelineError::model_load(format!("malformed manifest '{}': {e}", file.display()))
        })
    }

    /// Rebuild the architecture from the manifest, then load the
    /// weights into it. Trainable flags are re-applied because a
    /// loaded record does not carry them.
    pub fn load<B: Backend>(
        path:   &Path,
        device: &B::Device,
    ) -> PipelineResult<(CtScanClassifier<B>, ModelManifest)> {
        let manifest = Self::load_manifest(path)?;
        let file     = record_file(path);
        if !file.exists() {
            return Err(PipelineError::model_load(format!(
                "weights file '{}' not found. Have you run training first?",
                file.display()
            )));
        }

        let model = manifest
            .config
            .init::<B>(device)
            .load_file(record_stem(path), &CompactRecorder::new(), device)
            .map_err(|e| PipelineError::model_load(format!("'{}': {e}", file.display())))?
            .with_trainable(&manifest.trainable);

        tracing::info!(
            "Loaded {} model from {} ({} classes)",
            manifest.architecture,
            file.display(),
            manifest.labels.len()
        );
        Ok((model, manifest))
    }

    /// Byte-for-byte copy of both files of a saved model.
    pub fn copy(src: &Path, dst: &Path) -> Result<()> {
        ensure_parent(dst)?;
        for (from, to) in [
            (record_file(src), record_file(dst)),
            (manifest_file(src), manifest_file(dst)),
        ] {
            fs::copy(&from, &to).with_context(|| {
                format!("Cannot copy '{}' to '{}'", from.display(), to.display())
            })?;
        }
        tracing::info!("Exported model to {}", record_file(dst).display());
        Ok(())
    }

    /// Files that make up a saved model, for artifact logging.
    pub fn files(path: &Path) -> [PathBuf; 2] {
        [record_file(path), manifest_file(path)]
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_directories(&[parent])?;
    }
    Ok(())
}
