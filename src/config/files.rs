// ============================================================
// Config Loader — Raw Documents
// ============================================================
// Serde mirrors of the two declarative files:
//
//   config/config.yaml — paths, URLs, tracking names
//   params.yaml        — hyperparameters (UPPER_CASE keys)
//
// Every required key is a non-Option field, so a missing key
// fails at load time instead of deep inside a stage.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

// ─── config.yaml ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigFile {
    pub artifacts_root:     PathBuf,
    pub data_ingestion:     DataIngestionSection,
    pub prepare_base_model: PrepareBaseModelSection,
    pub training:           TrainingSection,
    #[serde(default)]
    pub evaluation:         EvaluationSection,
    pub mlflow:             MlflowSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIngestionSection {
    pub root_dir:        PathBuf,
    #[serde(rename = "source_URL")]
    pub source_url:      String,
    pub local_data_file: PathBuf,
    pub unzip_dir:       PathBuf,
    /// Top-level directory inside the archive.
    pub source_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareBaseModelSection {
    pub root_dir:                PathBuf,
    pub base_model_type:         String,
    pub base_model_path:         PathBuf,
    pub updated_base_model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSection {
    pub root_dir:           PathBuf,
    pub trained_model_path: PathBuf,
    pub model_export_path:  PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSection {
    pub root_dir:   PathBuf,
    pub score_file: PathBuf,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            root_dir:   PathBuf::from("artifacts/evaluation"),
            score_file: PathBuf::from("scores.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlflowSection {
    pub experiment_name:       String,
    pub registered_model_name: String,
}

// ─── params.yaml ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ParamsFile {
    pub image_size:         Vec<usize>,
    pub batch_size:         usize,
    pub augmentation:       bool,
    pub include_top:        bool,
    pub weights:            String,
    #[serde(default)]
    pub weights_file:       Option<PathBuf>,
    pub classes:            usize,
    pub freeze_all:         bool,
    #[serde(default)]
    pub freeze_till:        usize,
    pub epochs_head:        usize,
    pub epochs_fine:        usize,
    pub learning_rate_head: f64,
    pub learning_rate_fine: f64,
    #[serde(default = "default_seed")]
    pub seed:               u64,
}

fn default_seed() -> u64 {
    42
}

// ─── Readers ──────────────────────────────────────────────────────────────────

/// Read a YAML file into a typed document.
/// Missing, empty, and malformed files all map to `ConfigError`.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    let text = fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!("cannot read '{}': {e}", path.display()))
    })?;

    if text.trim().is_empty() {
        return Err(PipelineError::config(format!(
            "YAML file is empty: '{}'",
            path.display()
        )));
    }

    let doc = serde_yaml::from_str(&text).map_err(|e| {
        PipelineError::config(format!("malformed YAML in '{}': {e}", path.display()))
    })?;

    tracing::info!("YAML file loaded successfully: {}", path.display());
    Ok(doc)
}

/// Flatten a YAML mapping into `KEY → string` pairs.
/// Sequences render as `[a, b, c]`, nested maps use dotted keys.
pub fn flatten_yaml(value: &serde_yaml::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(&mut out, "", value);
    out
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: &str, value: &serde_yaml::Value) {
    use serde_yaml::Value;

    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => s.clone(),
                    other => scalar_to_string(other),
                };
                let full = if prefix.is_empty() { key } else { format!("{prefix}.{key}") };
                flatten_into(out, &full, v);
            }
        }
        Value::Sequence(items) => {
            let parts: Vec<String> = items.iter().map(scalar_to_string).collect();
            out.insert(prefix.to_string(), format!("[{}]", parts.join(", ")));
        }
        other => {
            out.insert(prefix.to_string(), scalar_to_string(other));
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value;

    match value {
        Value::Null => "None".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
