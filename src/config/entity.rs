// ============================================================
// Config Entities — one immutable record per stage
// ============================================================
// Built once by the ConfigurationManager and handed by value
// to the use case that runs the stage. Nothing in the
// pipeline mutates a record after construction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

// ─── ImageSize ────────────────────────────────────────────────────────────────
/// Input resolution as (height, width, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
}

impl ImageSize {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self { height, width, channels }
    }

    /// Parse the `IMAGE_SIZE` list; exactly three positive components.
    pub fn from_slice(dims: &[usize]) -> PipelineResult<Self> {
        match dims {
            [h, w, c] if *h > 0 && *w > 0 && *c > 0 => Ok(Self::new(*h, *w, *c)),
            [_, _, _] => Err(PipelineError::config(format!(
                "IMAGE_SIZE components must be positive, got {dims:?}"
            ))),
            _ => Err(PipelineError::config(format!(
                "IMAGE_SIZE must have exactly 3 components (H, W, C), got {}",
                dims.len()
            ))),
        }
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

// ─── Stage 1 ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct DataIngestionConfig {
    pub root_dir:        PathBuf,
    pub source_url:      String,
    pub local_data_file: PathBuf,
    pub unzip_dir:       PathBuf,
}

impl DataIngestionConfig {
    /// The drive file id: second-to-last `/` segment of the sharing link,
    /// e.g. `https://drive.google.com/file/d/<ID>/view?usp=sharing`.
    pub fn file_id(&self) -> PipelineResult<&str> {
        let segments: Vec<&str> = self.source_url.split('/').collect();
        if segments.len() < 2 {
            return Err(PipelineError::download(format!(
                "source URL '{}' has no file id segment",
                self.source_url
            )));
        }

        let id = segments[segments.len() - 2].trim();
        if id.is_empty() {
            return Err(PipelineError::download(format!(
                "source URL '{}' has an empty file id segment",
                self.source_url
            )));
        }
        Ok(id)
    }
}

// ─── Stage 2 ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PrepareBaseModelConfig {
    pub base_model_type:         String,
    pub root_dir:                PathBuf,
    pub base_model_path:         PathBuf,
    pub updated_base_model_path: PathBuf,
    pub image_size:              ImageSize,
    pub learning_rate:           f64,
    pub include_top:             bool,
    pub weights:                 String,
    pub weights_file:            Option<PathBuf>,
    pub num_classes:             usize,
    pub freeze_all:              bool,
    pub freeze_till:             usize,
}

// ─── Stage 3 ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub root_dir:                PathBuf,
    pub trained_model_path:      PathBuf,
    pub model_export_path:       PathBuf,
    pub updated_base_model_path: PathBuf,
    pub training_data:           PathBuf,
    pub batch_size:              usize,
    pub augmentation:            bool,
    pub image_size:              ImageSize,
    pub num_classes:             usize,
    pub epochs_head:             usize,
    pub epochs_fine:             usize,
    pub lr_head:                 f64,
    pub lr_fine:                 f64,
    pub freeze_all:              bool,
    pub freeze_till:             usize,
    pub seed:                    u64,
}

// ─── Stage 4 ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub model_path:            PathBuf,
    pub test_data:             PathBuf,
    pub root_dir:              PathBuf,
    pub score_file:            PathBuf,
    pub all_params:            BTreeMap<String, String>,
    /// `None` falls back to the local `./mlruns` file store.
    pub tracking_uri:          Option<String>,
    pub image_size:            ImageSize,
    pub batch_size:            usize,
    pub experiment_name:       String,
    pub registered_model_name: String,
}
