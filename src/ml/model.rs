use anyhow::{anyhow, Result};
use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

use crate::ml::backbone::{set_linear_trainable, Vgg16, Vgg16Config, FEATURE_LAYERS};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub backbone:     Vgg16Config,
    pub num_classes:  usize,
    #[config(default = 256)]
    pub hidden_units: usize,
    #[config(default = 0.5)]
    pub dropout:      f64,
    /// L2 factor on the hidden dense kernel
    #[config(default = 0.001)]
    pub l2:           f64,
}

impl ClassifierConfig {
    /// Fresh backbone and head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CtScanClassifier<B> {
        self.init_with_backbone(self.backbone.init(device), device)
    }

    /// Attach a fresh head to an existing backbone.
    pub fn init_with_backbone<B: Backend>(
        &self,
        backbone: Vgg16<B>,
        device:   &B::Device,
    ) -> CtScanClassifier<B> {
        let head = ClassifierHead {
            hidden:  LinearConfig::new(self.backbone.flat_features(), self.hidden_units).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output:  LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            relu:    Relu::new(),
        };
        CtScanClassifier { backbone, head }
    }
}

#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub hidden:  Linear<B>,
    pub dropout: Dropout,
    pub output:  Linear<B>,
    pub relu:    Relu,
}

#[derive(Module, Debug)]
pub struct CtScanClassifier<B: Backend> {
    pub backbone: Vgg16<B>,
    pub head:     ClassifierHead<B>,
}

impl<B: Backend> CtScanClassifier<B> {
    /// images: [batch, 3, H, W] → logits [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.backbone.forward(images);
        let x = self.head.relu.forward(self.head.hidden.forward(x));
        let x = self.head.dropout.forward(x);
        self.head.output.forward(x)
    }

    /// Softmax class probabilities, [batch, num_classes].
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Categorical cross-entropy against one-hot `targets`, plus the
    /// L2 penalty on the hidden kernel. Returns (loss, logits).
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 2>,
        l2:      f64,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss   = categorical_cross_entropy(logits.clone(), targets)
            + self.head.hidden.weight.val().powf_scalar(2.0).sum().mul_scalar(l2);
        (loss, logits)
    }

    /// Apply per-layer backbone flags; the head stays trainable.
    pub fn with_trainable(mut self, flags: &[bool]) -> Self {
        self.backbone = self.backbone.with_trainable(flags);
        set_linear_trainable(&mut self.head.hidden, true);
        set_linear_trainable(&mut self.head.output, true);
        self
    }

    pub fn num_classes(&self) -> usize {
        self.head.output.weight.val().dims()[1]
    }
}

/// mean over the batch of −Σ targets · log_softmax(logits)
pub fn categorical_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (targets * log_softmax(logits, 1)).sum_dim(1).mean().neg()
}

/// Row-wise arg-max of `[batch, classes]` scores, computed on the host.
/// Ties go to the lowest index.
pub fn predicted_classes<B: Backend>(scores: Tensor<B, 2>) -> Result<Vec<usize>> {
    let [_, classes] = scores.dims();
    let values = scores
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read model output: {e:?}"))?;

    Ok(values
        .chunks(classes.max(1))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect())
}

// ─── Freeze policy ────────────────────────────────────────────────────────────
/// Which backbone layers receive gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezePolicy {
    All,
    /// Freeze everything except the last k layers.
    AllButLast(usize),
    None,
}

impl FreezePolicy {
    /// `freeze_all` wins; otherwise `freeze_till > 0` keeps the
    /// last `freeze_till` layers trainable.
    pub fn from_flags(freeze_all: bool, freeze_till: usize) -> Self {
        if freeze_all {
            Self::All
        } else {
            Self::fine_tune(freeze_till)
        }
    }

    /// Fine-tuning ignores `freeze_all`: 0 unfreezes everything.
    pub fn fine_tune(freeze_till: usize) -> Self {
        if freeze_till > 0 {
            Self::AllButLast(freeze_till)
        } else {
            Self::None
        }
    }

    /// Trainable flag for each of `n` layers.
    pub fn flags(&self, n: usize) -> Vec<bool> {
        match *self {
            Self::All           => vec![false; n],
            Self::AllButLast(k) => (0..n).map(|i| i + k >= n).collect(),
            Self::None          => vec![true; n],
        }
    }
}

/// Fine-tune flags: the convolutional base (up to block5_pool)
/// follows `freeze_till`, top layers keep their current flags.
pub fn fine_tune_flags(current: &[bool], freeze_till: usize) -> Vec<bool> {
    let mut flags = FreezePolicy::fine_tune(freeze_till).flags(FEATURE_LAYERS);
    flags.extend(current.iter().skip(FEATURE_LAYERS).copied());
    flags
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::TensorData;

    type B  = NdArray;
    type AB = Autodiff<NdArray>;

    fn small_config(num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), num_classes)
    }

    #[test]
    fn test_freeze_policy_flags() {
        assert_eq!(FreezePolicy::from_flags(true, 4), FreezePolicy::All);
        assert_eq!(FreezePolicy::from_flags(false, 4), FreezePolicy::AllButLast(4));
        assert_eq!(FreezePolicy::from_flags(false, 0), FreezePolicy::None);

        assert_eq!(FreezePolicy::AllButLast(2).flags(4), vec![false, false, true, true]);
        assert_eq!(FreezePolicy::AllButLast(9).flags(3), vec![true; 3]);
        assert_eq!(FreezePolicy::All.flags(2), vec![false; 2]);
    }

    #[test]
    fn test_fine_tune_flags_keep_top_layers() {
        let current = FreezePolicy::All.flags(FEATURE_LAYERS + 4);
        let flags   = fine_tune_flags(&current, 4);
        assert_eq!(flags.len(), FEATURE_LAYERS + 4);
        assert_eq!(flags.iter().filter(|f| **f).count(), 4);
        assert!(flags[FEATURE_LAYERS - 1]);
        assert!(!flags[FEATURE_LAYERS]);
    }

    #[test]
    fn test_predicted_classes_is_row_argmax() {
        let scores = Tensor::<B, 2>::from_data(
            TensorData::new(vec![0.1f32, 0.7, 0.2, 0.5, 0.5, 0.0], [2, 3]),
            &Default::default(),
        );
        assert_eq!(predicted_classes(scores).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_output_is_a_four_way_distribution() {
        let device = Default::default();
        let model  = small_config(4).init::<B>(&device);

        let probs = model.probabilities(Tensor::ones([3, 3, 32, 32], &device));
        assert_eq!(probs.dims(), [3, 4]);

        let values = probs.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for row in values.chunks(4) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_freeze_all_leaves_only_head_trainable() {
        let device = Default::default();
        let model  = small_config(4)
            .init::<AB>(&device)
            .with_trainable(&FreezePolicy::All.flags(FEATURE_LAYERS));

        assert_eq!(model.backbone.num_trainable_params(), 0);
        assert!(model.head.hidden.weight.val().is_require_grad());
        assert!(model.head.output.weight.val().is_require_grad());
    }

    #[test]
    fn test_cross_entropy_of_perfect_prediction_is_small() {
        let device  = Default::default();
        let logits  = Tensor::<B, 2>::from_data(TensorData::new(vec![20.0f32, 0.0, 0.0, 20.0], [2, 2]), &device);
        let targets = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0], [2, 2]), &device);
        let loss: f32 = categorical_cross_entropy(logits, targets).into_scalar().elem();
        assert!(loss < 1e-3);

        let uniform = Tensor::<B, 2>::zeros([1, 4], &device);
        let target  = Tensor::<B, 2>::from_data(TensorData::new(vec![0.0f32, 1.0, 0.0, 0.0], [1, 4]), &device);
        let loss: f32 = categorical_cross_entropy(uniform, target).into_scalar().elem();
        assert!((loss - 4f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_loss_includes_l2_penalty() {
        let device  = Default::default();
        let model   = small_config(2).init::<B>(&device);
        let images  = Tensor::<B, 4>::zeros([1, 3, 32, 32], &device);
        let targets = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [1, 2]), &device);

        let (plain, _)     = model.forward_loss(images.clone(), targets.clone(), 0.0);
        let (penalised, _) = model.forward_loss(images, targets, 0.001);
        let plain: f32     = plain.into_scalar().elem();
        let penalised: f32 = penalised.into_scalar().elem();
        assert!(penalised > plain);
    }
}
