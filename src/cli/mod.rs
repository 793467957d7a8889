// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and hands every piece of work to Layer 2 or to the
// HTTP service.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::application::pipeline::Pipeline;
use crate::application::predict_use_case::{ModelSource, PredictUseCase, PRODUCTION_STAGE};
use crate::config::manager::{CONFIG_FILE_PATH, PARAMS_FILE_PATH};
use crate::server::{self, AppState};
use commands::{Commands, ModelArgs, PredictArgs, ServeArgs};

/// Directory registry downloads are cached in.
const REGISTRY_CACHE_DIR: &str = "artifacts/registry";

#[derive(Parser, Debug)]
#[command(
    name = "ctscan-classifier",
    version = "0.1.0",
    about = "Train a VGG16 CT-scan classifier from config files, then serve predictions."
)]
pub struct Cli {
    /// Path to config.yaml
    #[arg(long, global = true, default_value = CONFIG_FILE_PATH)]
    pub config: PathBuf,

    /// Path to params.yaml
    #[arg(long, global = true, default_value = PARAMS_FILE_PATH)]
    pub params: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let pipeline = Pipeline::new(&self.config, &self.params);
        match self.command {
            Commands::Run            => pipeline.run_all(),
            Commands::Stage(args)    => pipeline.run_stage(args.stage),
            Commands::Predict(args)  => run_predict(&pipeline, args),
            Commands::Serve(args)    => run_serve(pipeline, args),
        }
    }
}

/// Resolve `--model` / `--from-registry` against config.yaml.
fn model_source(pipeline: &Pipeline, args: &ModelArgs) -> Result<ModelSource> {
    if let Some(path) = &args.model {
        return Ok(ModelSource::Path(path.clone()));
    }

    let manager = pipeline.configuration()?;
    if args.from_registry {
        return Ok(ModelSource::Registry {
            tracking_uri: args.tracking_uri.clone(),
            model_name:   manager.registered_model_name().to_string(),
            stage:        PRODUCTION_STAGE.to_string(),
            cache_dir:    PathBuf::from(REGISTRY_CACHE_DIR),
        });
    }
    Ok(ModelSource::Path(manager.export_model_path().to_path_buf()))
}

fn run_predict(pipeline: &Pipeline, args: PredictArgs) -> Result<()> {
    let source      = model_source(pipeline, &args.model)?;
    let use_case    = PredictUseCase::from_source(&source)?;
    let predictions = use_case.predict_file(&args.image)?;

    println!("{}", serde_json::to_string(&predictions)?);
    Ok(())
}

fn run_serve(pipeline: Pipeline, args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    let classifier = match model_source(&pipeline, &args.model).and_then(|s| s.load()) {
        Ok(classifier) => Some(classifier),
        Err(e) if args.allow_missing_model => {
            tracing::warn!("Starting without a model: {e:#}");
            None
        }
        Err(e) => return Err(e.context("No loadable model (use --allow-missing-model to start anyway)")),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(addr, AppState { classifier, pipeline }))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::Stage;

    #[test]
    fn test_parses_stage_and_globals() {
        let cli = Cli::try_parse_from([
            "ctscan-classifier", "stage", "train", "--config", "c.yaml", "--params", "p.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("c.yaml"));
        assert!(matches!(cli.command, Commands::Stage(ref a) if a.stage == Stage::Train));
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["ctscan-classifier", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else { panic!("expected serve") };
        assert_eq!(args.port, 8080);
        assert!(!args.allow_missing_model);
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE_PATH));
    }

    #[test]
    fn test_model_and_registry_conflict() {
        let parsed = Cli::try_parse_from([
            "ctscan-classifier", "predict", "--image", "a.png", "--model", "m", "--from-registry",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_explicit_model_path_skips_config() {
        let pipeline = Pipeline::new("/missing/config.yaml", "/missing/params.yaml");
        let args = ModelArgs {
            model:         Some(PathBuf::from("model/model")),
            from_registry: false,
            tracking_uri:  None,
        };
        assert!(matches!(model_source(&pipeline, &args).unwrap(), ModelSource::Path(p) if p == PathBuf::from("model/model")));
    }

    #[test]
    fn test_serve_without_model_fails_unless_allowed() {
        let pipeline = Pipeline::new("/missing/config.yaml", "/missing/params.yaml");
        let args = ServeArgs {
            host:                "127.0.0.1".into(),
            port:                0,
            model:               ModelArgs {
                model:         Some(PathBuf::from("/missing/model")),
                from_registry: false,
                tracking_uri:  None,
            },
            allow_missing_model: false,
        };
        let err = run_serve(pipeline, args).unwrap_err();
        assert!(err.to_string().contains("--allow-missing-model"));
    }
}
