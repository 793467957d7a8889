// ============================================================
// Config Loader
// ============================================================
// Turns the two YAML files into typed, per-stage records.
//
//   files.rs   — serde mirrors of config.yaml / params.yaml
//   entity.rs  — immutable records handed to each stage
//   manager.rs — ConfigurationManager: load once, derive many

pub mod entity;
pub mod files;
pub mod manager;

pub use entity::{
    DataIngestionConfig, EvaluationConfig, ImageSize, PrepareBaseModelConfig, TrainingConfig,
};
pub use manager::ConfigurationManager;
