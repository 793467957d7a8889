// ============================================================
// Layer 2 — Stage 2: Prepare Base Model
// ============================================================
//   Step 1: Build VGG16 at the configured input size
//           (random init, or pretrained weights from a record)
//   Step 2: Save it unmodified to base_model_path
//   Step 3: Apply the freeze policy to the backbone
//   Step 4: Attach the head: flatten → dense(256, relu, L2)
//           → dropout(0.5) → dense(classes) → softmax
//   Step 5: Save backbone + head with its manifest (Adam,
//           categorical cross-entropy, learning rate, label
//           table, trainable flags) to updated_base_model_path
//
// The same config always yields the same architecture.

use anyhow::Result;
use burn::prelude::*;

use crate::config::PrepareBaseModelConfig;
use crate::domain::labels::ClassLabels;
use crate::infra::checkpoint::{ModelManifest, ModelStore};
use crate::ml::{
    backbone::{build_backbone, Vgg16, Vgg16Config},
    default_device,
    model::{ClassifierConfig, CtScanClassifier, FreezePolicy},
    InnerBackend,
};

pub struct PrepareBaseModelUseCase {
    config: PrepareBaseModelConfig,
}

impl PrepareBaseModelUseCase {
    pub fn new(config: PrepareBaseModelConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        self.run::<InnerBackend>(&default_device())?;
        Ok(())
    }

    pub fn run<B: Backend>(&self, device: &B::Device) -> Result<(CtScanClassifier<B>, ModelManifest)> {
        let backbone = self.get_base_model::<B>(device)?;
        self.update_base_model(backbone, device)
    }

    fn backbone_config(&self) -> Vgg16Config {
        Vgg16Config::from_image_size(self.config.image_size, self.config.include_top)
    }

    pub fn get_base_model<B: Backend>(&self, device: &B::Device) -> Result<Vgg16<B>> {
        let cfg      = &self.config;
        let vgg_cfg  = self.backbone_config();
        let backbone = build_backbone::<B>(
            &cfg.base_model_type,
            &vgg_cfg,
            &cfg.weights,
            cfg.weights_file.as_deref(),
            device,
        )?;

        ModelStore::save_backbone(&backbone, &vgg_cfg, &cfg.base_model_path)?;
        tracing::info!(
            "Base model ({}, input {:?}, include_top={}) saved to {}",
            cfg.base_model_type,
            vgg_cfg.input_shape(),
            vgg_cfg.include_top,
            cfg.base_model_path.display()
        );
        Ok(backbone)
    }

    pub fn update_base_model<B: Backend>(
        &self,
        backbone: Vgg16<B>,
        device:   &B::Device,
    ) -> Result<(CtScanClassifier<B>, ModelManifest)> {
        let cfg    = &self.config;
        let policy = FreezePolicy::from_flags(cfg.freeze_all, cfg.freeze_till);
        let flags  = policy.flags(backbone.layers().len());

        let model_cfg = ClassifierConfig::new(self.backbone_config(), cfg.num_classes);
        let model     = model_cfg
            .init_with_backbone(backbone, device)
            .with_trainable(&flags);

        let manifest = ModelManifest::new(
            &cfg.base_model_type,
            model_cfg,
            ClassLabels::default_for(cfg.num_classes),
            cfg.learning_rate,
            flags,
        );
        ModelStore::save(&model, &manifest, &cfg.updated_base_model_path)?;

        log_summary(&model, &manifest, policy);
        tracing::info!("Updated base model saved to {}", cfg.updated_base_model_path.display());
        Ok((model, manifest))
    }
}

fn log_summary<B: Backend>(model: &CtScanClassifier<B>, manifest: &ModelManifest, policy: FreezePolicy) {
    let layers = model.backbone.layers();
    for (spec, trainable) in layers.iter().zip(&manifest.trainable) {
        tracing::debug!("  {:<14} trainable={}", spec.name, trainable);
    }
    tracing::info!(
        "Model: {} backbone layers ({} trainable, {:?}), head {}→{}→{}, {} parameters, optimizer={} lr={} loss={}",
        layers.len(),
        manifest.num_trainable_layers(),
        policy,
        manifest.config.backbone.flat_features(),
        manifest.config.hidden_units,
        manifest.config.num_classes,
        model.num_params(),
        manifest.optimizer,
        manifest.learning_rate,
        manifest.loss,
    );
}
