// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn framework specific code:
// network definitions, the fit loop, scoring and inference.
//
// What's in this layer:
//
//   backbone.rs   — VGG16 convolutional backbone
//                   • 13 conv 3×3 layers in 5 blocks, each
//                     block closed by a 2×2 max-pool
//                   • optional dense top (4096 → 4096 → 1000)
//                   • named layer list used by freeze policies
//
//   model.rs      — Backbone + classification head
//                   flatten → dense(256, relu) → dropout(0.5)
//                   → dense(num_classes) → softmax
//                   plus categorical cross-entropy with L2
//
//   callbacks.rs  — Early stopping and LR-on-plateau
//
//   trainer.rs    — Two-phase fit (head, then fine-tune)
//
//   evaluator.rs  — Scores a model on a held-out stream
//
//   inferencer.rs — Loads one model and classifies images
//
// Backend selection:
//   default        → Wgpu (GPU through wgpu)
//   --features cpu → NdArray
//   Training wraps the inner backend in Autodiff.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Simonyan & Zisserman (2015) Very Deep Convolutional
//            Networks for Large-Scale Image Recognition

use burn::prelude::Backend;

/// VGG16 backbone and its layer table
pub mod backbone;

/// Backbone + classification head, loss and freeze policy
pub mod model;

/// Early stopping and learning-rate reduction on plateau
pub mod callbacks;

/// Two-phase training loop
pub mod trainer;

/// Held-out evaluation
pub mod evaluator;

/// Inference engine — loads a model and predicts a label
pub mod inferencer;

#[cfg(not(feature = "cpu"))]
pub type InnerBackend = burn::backend::Wgpu;

#[cfg(feature = "cpu")]
pub type InnerBackend = burn::backend::NdArray;

pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;

pub type Device = <InnerBackend as Backend>::Device;

pub fn default_device() -> Device {
    let device = Device::default();
    tracing::info!("Using device: {:?}", device);
    device
}
