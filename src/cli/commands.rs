// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Four subcommands:
//
//   run      — all pipeline stages in order
//   stage    — one named stage
//   predict  — label a single image file
//   serve    — start the HTTP inference service
//
// clap's derive macros generate help text, error messages for
// missing args, and type conversion.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::pipeline::Stage;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run ingest → prepare → train → evaluate
    Run,

    /// Run a single pipeline stage
    Stage(StageArgs),

    /// Classify one CT-scan image with a trained model
    Predict(PredictArgs),

    /// Serve the web page, /predict and /train over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct StageArgs {
    #[arg(value_enum)]
    pub stage: Stage,
}

/// Where to load the model from. Defaults to the exported model
/// path in config.yaml.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Saved model path (without extension)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Load the Production version of the registered model from
    /// the tracking server instead of a local path
    #[arg(long, conflicts_with = "model")]
    pub from_registry: bool,

    /// Tracking server URI used with --from-registry
    #[arg(long, env = "MLFLOW_TRACKING_URI")]
    pub tracking_uri: Option<String>,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long)]
    pub image: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Start even if no model can be loaded (/predict answers 503)
    #[arg(long)]
    pub allow_missing_model: bool,
}
