// ============================================================
// Layer 5 — VGG16 Backbone
// ============================================================
// The 16-layer VGG network, minus nothing and plus nothing:
//
//   block   convs   filters   output (224×224 input)
//   ─────   ─────   ───────   ──────────────────────
//   1       2       64        112 × 112 × 64
//   2       2       128       56 × 56 × 128
//   3       3       256       28 × 28 × 256
//   4       3       512       14 × 14 × 512
//   5       3       512       7 × 7 × 512    ← block5_pool
//
// Every conv is 3×3, stride 1, "same" padding, followed by
// ReLU. Every block ends with a 2×2 max-pool, stride 2.
//
// With include_top the classic dense top is appended:
//   flatten → fc1 (4096, relu) → fc2 (4096, relu)
//           → predictions (1000, softmax)
// The top's weight shapes only line up for a 224×224×3 input.
//
// Layers are addressed by name and position through
// `layer_table`, which is what the freeze policies walk:
//
//   0  block1_conv1     9  block3_pool     18 flatten      ┐
//   1  block1_conv2    10  block4_conv1    19 fc1          │ top
//   2  block1_pool     ...                 20 fc2          │ only
//   ...                17  block5_pool     21 predictions  ┘
//
// Reference: Simonyan & Zisserman (2015)
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    record::CompactRecorder,
    tensor::activation::softmax,
};
use std::path::Path;

use crate::config::ImageSize;
use crate::error::{PipelineError, PipelineResult};
use crate::infra::checkpoint::{record_file, record_stem};

/// (conv layers, filters) per block.
pub const VGG16_BLOCKS: [(usize, usize); 5] = [(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)];

/// Convolution and pooling layers, input excluded.
pub const FEATURE_LAYERS: usize = 18;

/// Last layer of the convolutional base.
pub const LANDMARK_LAYER: &str = "block5_pool";

pub const TOP_UNITS:        usize = 4096;
pub const IMAGENET_CLASSES: usize = 1000;

/// The only input the dense top accepts.
pub const TOP_INPUT: ImageSize = ImageSize { height: 224, width: 224, channels: 3 };

/// Every block halves the spatial size.
const DOWNSAMPLE: usize = 32;

// ─── Layer table ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Index into `Vgg16::convs`
    Conv(usize),
    Pool,
    Flatten,
    /// 0 = fc1, 1 = fc2, 2 = predictions
    Dense(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
}

pub fn layer_table(include_top: bool) -> Vec<LayerSpec> {
    let mut layers = Vec::with_capacity(FEATURE_LAYERS + 4);
    let mut conv_idx = 0;

    for (b, &(convs, _)) in VGG16_BLOCKS.iter().enumerate() {
        for c in 0..convs {
            layers.push(LayerSpec {
                name: format!("block{}_conv{}", b + 1, c + 1),
                kind: LayerKind::Conv(conv_idx),
            });
            conv_idx += 1;
        }
        layers.push(LayerSpec { name: format!("block{}_pool", b + 1), kind: LayerKind::Pool });
    }

    if include_top {
        layers.push(LayerSpec { name: "flatten".into(), kind: LayerKind::Flatten });
        for (i, name) in ["fc1", "fc2", "predictions"].iter().enumerate() {
            layers.push(LayerSpec { name: name.to_string(), kind: LayerKind::Dense(i) });
        }
    }
    layers
}

// ─── Config ───────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct Vgg16Config {
    pub height:      usize,
    pub width:       usize,
    pub channels:    usize,
    pub include_top: bool,
}

impl Vgg16Config {
    pub fn from_image_size(size: ImageSize, include_top: bool) -> Self {
        Self::new(size.height, size.width, size.channels, include_top)
    }

    pub fn input_shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.channels != 3 {
            return Err(PipelineError::config(format!(
                "VGG16 expects 3 input channels, got {}",
                self.channels
            )));
        }
        if self.height < DOWNSAMPLE || self.width < DOWNSAMPLE {
            return Err(PipelineError::config(format!(
                "VGG16 input must be at least {DOWNSAMPLE}×{DOWNSAMPLE}, got {}×{}",
                self.height, self.width
            )));
        }
        if self.include_top && self.input_shape() != TOP_INPUT.as_array() {
            return Err(PipelineError::config(format!(
                "include_top requires a 224×224×3 input, got {:?}",
                self.input_shape()
            )));
        }
        Ok(())
    }

    /// Width of the flattened output.
    pub fn flat_features(&self) -> usize {
        if self.include_top {
            IMAGENET_CLASSES
        } else {
            self.conv_features()
        }
    }

    fn conv_features(&self) -> usize {
        512 * (self.height / DOWNSAMPLE) * (self.width / DOWNSAMPLE)
    }

    pub fn layers(&self) -> Vec<LayerSpec> {
        layer_table(self.include_top)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let mut convs    = Vec::with_capacity(13);
        let mut channels = self.channels;
        for &(n, filters) in VGG16_BLOCKS.iter() {
            for _ in 0..n {
                convs.push(
                    Conv2dConfig::new([channels, filters], [3, 3])
                        .with_padding(PaddingConfig2d::Same)
                        .init(device),
                );
                channels = filters;
            }
        }

        let top = self.include_top.then(|| VggTop {
            fc1:         LinearConfig::new(self.conv_features(), TOP_UNITS).init(device),
            fc2:         LinearConfig::new(TOP_UNITS, TOP_UNITS).init(device),
            predictions: LinearConfig::new(TOP_UNITS, IMAGENET_CLASSES).init(device),
        });

        Vgg16 {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            top,
            relu: Relu::new(),
        }
    }
}

// ─── Model ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct VggTop<B: Backend> {
    pub fc1:         Linear<B>,
    pub fc2:         Linear<B>,
    pub predictions: Linear<B>,
}

#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub pool:  MaxPool2d,
    pub top:   Option<VggTop<B>>,
    pub relu:  Relu,
}

impl<B: Backend> Vgg16<B> {
    pub fn has_top(&self) -> bool {
        self.top.is_some()
    }

    pub fn layers(&self) -> Vec<LayerSpec> {
        layer_table(self.has_top())
    }

    /// images: [batch, 3, H, W] → [batch, 512, H/32, W/32]
    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x     = images;
        let mut convs = self.convs.iter();
        for &(n, _) in VGG16_BLOCKS.iter() {
            for conv in convs.by_ref().take(n) {
                x = self.relu.forward(conv.forward(x));
            }
            x = self.pool.forward(x);
        }
        x
    }

    /// images: [batch, 3, H, W] → [batch, flat_features]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.forward_features(images).flatten::<2>(1, 3);
        match &self.top {
            Some(top) => {
                let x = self.relu.forward(top.fc1.forward(x));
                let x = self.relu.forward(top.fc2.forward(x));
                softmax(top.predictions.forward(x), 1)
            }
            None => x,
        }
    }

    /// Set require-grad per layer, in `layer_table` order.
    /// A shorter slice leaves the remaining layers untouched.
    pub fn with_trainable(mut self, flags: &[bool]) -> Self {
        for (spec, &trainable) in self.layers().iter().zip(flags) {
            match spec.kind {
                LayerKind::Conv(i) => {
                    if let Some(conv) = self.convs.get_mut(i) {
                        conv.weight = conv.weight.clone().set_require_grad(trainable);
                        conv.bias   = conv.bias.take().map(|b| b.set_require_grad(trainable));
                    }
                }
                LayerKind::Dense(i) => {
                    if let Some(top) = self.top.as_mut() {
                        let dense = match i {
                            0 => &mut top.fc1,
                            1 => &mut top.fc2,
                            _ => &mut top.predictions,
                        };
                        set_linear_trainable(dense, trainable);
                    }
                }
                LayerKind::Pool | LayerKind::Flatten => {}
            }
        }
        self
    }

    /// Parameters that will receive gradients.
    pub fn num_trainable_params(&self) -> usize {
        let convs: usize = self
            .convs
            .iter()
            .filter(|c| c.weight.val().is_require_grad())
            .map(|c| c.num_params())
            .sum();
        let top: usize = self.top.iter().flat_map(|t| [&t.fc1, &t.fc2, &t.predictions])
            .filter(|l| l.weight.val().is_require_grad())
            .map(|l| l.num_params())
            .sum();
        convs + top
    }
}

pub(crate) fn set_linear_trainable<B: Backend>(linear: &mut Linear<B>, trainable: bool) {
    linear.weight = linear.weight.clone().set_require_grad(trainable);
    linear.bias   = linear.bias.take().map(|b| b.set_require_grad(trainable));
}

// ─── Construction ─────────────────────────────────────────────────────────────
/// Weight tags that mean "start from random initialisation".
pub const RANDOM_WEIGHTS: [&str; 2] = ["none", "random"];

/// Build the backbone named by `base_model_type`.
///
/// `weights` other than none/random loads a record of pretrained
/// weights from `weights_file`; the record's architecture must
/// match (`include_top` included).
pub fn build_backbone<B: Backend>(
    base_model_type: &str,
    cfg:             &Vgg16Config,
    weights:         &str,
    weights_file:    Option<&Path>,
    device:          &B::Device,
) -> PipelineResult<Vgg16<B>> {
    if !base_model_type.eq_ignore_ascii_case("vgg16") {
        return Err(PipelineError::UnsupportedArchitecture(base_model_type.to_string()));
    }
    cfg.validate()?;

    let model = cfg.init::<B>(device);
    if RANDOM_WEIGHTS.iter().any(|w| weights.eq_ignore_ascii_case(w)) {
        tracing::info!("VGG16 initialised with random weights");
        return Ok(model);
    }

    let path = weights_file.ok_or_else(|| {
        PipelineError::model_load(format!("weights '{weights}' requested but WEIGHTS_FILE is not set"))
    })?;
    let file = record_file(path);
    if !file.exists() {
        return Err(PipelineError::model_load(format!(
            "pretrained weights file '{}' not found",
            file.display()
        )));
    }

    let model = model
        .load_file(record_stem(path), &CompactRecorder::new(), device)
        .map_err(|e| PipelineError::model_load(format!("'{}': {e}", file.display())))?;
    tracing::info!("VGG16 loaded '{}' weights from {}", weights, file.display());
    Ok(model)
}
