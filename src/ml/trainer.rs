// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Two-phase fit with Adam:
//
//   Phase A — head
//     backbone frozen per (freeze_all, freeze_till)
//     Adam at lr_head, epochs_head epochs, no callbacks
//
//   Phase B — fine_tune
//     convolutional base (through block5_pool) unfrozen,
//     then all but its last freeze_till layers re-frozen
//     fresh Adam at lr_fine, epochs_fine epochs
//     EarlyStopping + ReduceLrOnPlateau on val_loss
//     best snapshot restored when the phase ends
//
// Each epoch walks floor(N / batch_size) training batches and
// floor(M / batch_size) validation batches. With no complete
// validation batch the callbacks have nothing to watch and are
// skipped.
//
// Key Burn 0.20 insight:
//   - Training runs on B (Autodiff) for gradients
//   - model.valid() returns the model on B::InnerBackend, so
//     validation batches are built for the inner backend
//   - Frozen parameters produce no gradients, so Adam leaves
//     them untouched
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::config::TrainingConfig;
use crate::data::stream::ImageStream;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::ml::model::{fine_tune_flags, predicted_classes, CtScanClassifier, FreezePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Head,
    FineTune,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Head     => "head",
            Phase::FineTune => "fine_tune",
        }
    }
}

/// Epoch counts, learning rates and freeze settings for both phases.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub epochs_head: usize,
    pub epochs_fine: usize,
    pub lr_head:     f64,
    pub lr_fine:     f64,
    pub freeze_all:  bool,
    pub freeze_till: usize,
}

impl From<&TrainingConfig> for Schedule {
    fn from(cfg: &TrainingConfig) -> Self {
        Self {
            epochs_head: cfg.epochs_head,
            epochs_fine: cfg.epochs_fine,
            lr_head:     cfg.lr_head,
            lr_fine:     cfg.lr_fine,
            freeze_all:  cfg.freeze_all,
            freeze_till: cfg.freeze_till,
        }
    }
}

/// Mean loss and accuracy over one pass of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassStats {
    pub loss:     f64,
    pub accuracy: f64,
    pub batches:  usize,
}

pub struct TrainOutcome<B: AutodiffBackend> {
    pub model:         CtScanClassifier<B>,
    /// Backbone flags in effect at the end of training.
    pub trainable:     Vec<bool>,
    /// Learning rate of the last epoch run.
    pub learning_rate: f64,
    pub history:       Vec<EpochMetrics>,
}

pub struct Trainer<'a, B: AutodiffBackend> {
    train:   &'a ImageStream,
    valid:   &'a ImageStream,
    l2:      f64,
    device:  B::Device,
    metrics: Option<&'a MetricsLogger>,
}

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    pub fn new(train: &'a ImageStream, valid: &'a ImageStream, l2: f64, device: B::Device) -> Self {
        Self { train, valid, l2, device, metrics: None }
    }

    pub fn with_metrics(mut self, logger: &'a MetricsLogger) -> Self {
        self.metrics = Some(logger);
        self
    }

    pub fn fit(&self, model: CtScanClassifier<B>, schedule: &Schedule) -> Result<TrainOutcome<B>> {
        tracing::info!(
            "Training: {} steps/epoch, {} validation steps/epoch",
            self.train.steps_per_epoch(),
            self.valid.steps_per_epoch()
        );
        if self.valid.steps_per_epoch() == 0 {
            tracing::warn!(
                "Validation set ({} images) is smaller than one batch; validation and callbacks are skipped",
                self.valid.len()
            );
        }

        let mut history = Vec::new();

        // ── Phase A: head only ────────────────────────────────────────────────
        let layers  = model.backbone.layers().len();
        let flags_a = FreezePolicy::from_flags(schedule.freeze_all, schedule.freeze_till).flags(layers);
        let model   = model.with_trainable(&flags_a);
        tracing::info!(
            "Phase A: {} of {} backbone layers trainable, lr={}",
            flags_a.iter().filter(|f| **f).count(),
            layers,
            schedule.lr_head
        );
        let (model, lr_a) = self.fit_phase(
            model,
            Phase::Head,
            schedule.epochs_head,
            schedule.lr_head,
            0,
            &mut history,
        )?;

        // ── Phase B: fine-tune through block5_pool ────────────────────────────
        let flags_b = fine_tune_flags(&flags_a, schedule.freeze_till);
        let model   = model.with_trainable(&flags_b);
        tracing::info!(
            "Phase B: {} of {} backbone layers trainable, lr={}",
            flags_b.iter().filter(|f| **f).count(),
            layers,
            schedule.lr_fine
        );
        let (model, lr_b) = self.fit_phase(
            model,
            Phase::FineTune,
            schedule.epochs_fine,
            schedule.lr_fine,
            schedule.epochs_head,
            &mut history,
        )?;

        let learning_rate = if schedule.epochs_fine > 0 { lr_b } else { lr_a };
        Ok(TrainOutcome { model, trainable: flags_b, learning_rate, history })
    }

    /// Run one phase. `offset` shifts the shuffle seed so the two
    /// phases don't replay the same epoch order.
    fn fit_phase(
        &self,
        mut model: CtScanClassifier<B>,
        phase:     Phase,
        epochs:    usize,
        lr:        f64,
        offset:    usize,
        history:   &mut Vec<EpochMetrics>,
    ) -> Result<(CtScanClassifier<B>, f64)> {
        let callbacks   = phase == Phase::FineTune;
        let mut optim   = AdamConfig::new().with_epsilon(1e-7).init();
        let mut lr      = lr;
        let mut early   = EarlyStopping::<CtScanClassifier<B>>::default();
        let mut plateau = ReduceLrOnPlateau::default();

        for epoch in 1..=epochs {
            // ── Training pass ─────────────────────────────────────────────────
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;
            let mut correct  = 0usize;
            let mut seen     = 0usize;

            for batch in self.train.batches::<B>(offset + epoch, &self.device) {
                let batch = batch?;
                let (loss, logits) = model.forward_loss(batch.images, batch.targets, self.l2);

                loss_sum += loss.clone().into_scalar().elem::<f64>();
                batches  += 1;
                correct  += count_correct(&predicted_classes(logits)?, &batch.labels);
                seen     += batch.labels.len();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
            }

            let train = PassStats {
                loss:     if batches > 0 { loss_sum / batches as f64 } else { f64::NAN },
                accuracy: if seen > 0 { correct as f64 / seen as f64 } else { 0.0 },
                batches,
            };

            // ── Validation pass (no autodiff, dropout off) ────────────────────
            let val = validate(&model.valid(), self.valid, self.l2, &self.device)?;

            let row = EpochMetrics {
                phase:        phase.name().to_string(),
                epoch,
                loss:         train.loss,
                accuracy:     train.accuracy,
                val_loss:     val.map_or(f64::NAN, |v| v.loss),
                val_accuracy: val.map_or(f64::NAN, |v| v.accuracy),
                lr,
            };
            tracing::info!(
                "[{}] Epoch {:>3}/{} | loss={:.4} | accuracy={:.4} | val_loss={:.4} | val_accuracy={:.4} | lr={:e}",
                row.phase, epoch, epochs, row.loss, row.accuracy, row.val_loss, row.val_accuracy, lr,
            );
            if let Some(logger) = self.metrics {
                logger.log(&row)?;
            }
            history.push(row);

            // ── Callbacks ─────────────────────────────────────────────────────
            if let (true, Some(val)) = (callbacks, val) {
                if early.on_epoch_end(epoch, val.loss, &model) {
                    tracing::info!(
                        "Early stopping at epoch {} (best val_loss={:.4} at epoch {:?})",
                        epoch,
                        early.best(),
                        early.best_epoch()
                    );
                    break;
                }
                lr = plateau.on_epoch_end(val.loss, lr);
            }
        }

        if let Some(best_epoch) = early.best_epoch() {
            if let Some(best) = early.into_best() {
                tracing::info!("Restoring model weights from epoch {}", best_epoch);
                model = best;
            }
        }
        Ok((model, lr))
    }
}

/// One pass over `stream`; `None` when it yields no batches.
pub fn validate<B: Backend>(
    model:  &CtScanClassifier<B>,
    stream: &ImageStream,
    l2:     f64,
    device: &B::Device,
) -> Result<Option<PassStats>> {
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut correct  = 0usize;
    let mut seen     = 0usize;

    for batch in stream.batches::<B>(0, device) {
        let batch = batch?;
        let (loss, logits) = model.forward_loss(batch.images, batch.targets, l2);
        loss_sum += loss.into_scalar().elem::<f64>();
        batches  += 1;
        correct  += count_correct(&predicted_classes(logits)?, &batch.labels);
        seen     += batch.labels.len();
    }

    if batches == 0 {
        return Ok(None);
    }
    Ok(Some(PassStats {
        loss:     loss_sum / batches as f64,
        accuracy: correct as f64 / seen.max(1) as f64,
        batches,
    }))
}

fn count_correct(predicted: &[usize], labels: &[usize]) -> usize {
    predicted.iter().zip(labels).filter(|(p, l)| p == l).count()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSize;
    use crate::data::{loader::ImageSample, preprocessor::Preprocessor};
    use crate::ml::backbone::{Vgg16Config, FEATURE_LAYERS};
    use crate::ml::model::ClassifierConfig;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use std::path::Path;

    type AB = Autodiff<NdArray>;

    fn write_samples(dir: &Path, per_class: usize) -> Vec<ImageSample> {
        let mut samples = Vec::new();
        for label in 0..2 {
            for i in 0..per_class {
                let path = dir.join(format!("{label}_{i}.png"));
                let v    = if label == 0 { 20 } else { 230 };
                RgbImage::from_pixel(32, 32, Rgb([v, v, v])).save(&path).unwrap();
                samples.push(ImageSample { path, label });
            }
        }
        samples
    }

    fn schedule(epochs_head: usize, epochs_fine: usize) -> Schedule {
        Schedule {
            epochs_head,
            epochs_fine,
            lr_head: 1e-3,
            lr_fine: 1e-4,
            freeze_all: true,
            freeze_till: 2,
        }
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Head.name(), "head");
        assert_eq!(Phase::FineTune.name(), "fine_tune");
    }

    #[test]
    fn test_count_correct() {
        assert_eq!(count_correct(&[0, 1, 2, 3], &[0, 1, 3, 3]), 3);
    }

    #[test]
    fn test_frozen_backbone_is_untouched_by_head_training() {
        let dir    = tempfile::tempdir().unwrap();
        let device = NdArrayDevice::default();
        let pre    = Preprocessor::new(ImageSize::new(32, 32, 3));
        let train  = ImageStream::training(write_samples(dir.path(), 2), pre, 2, 2, 42, false);
        let valid  = ImageStream::validation(Vec::new(), pre, 2, 2);

        let cfg   = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), 2);
        let model = cfg.init::<AB>(&device);
        let conv_before = model.backbone.convs[0].weight.val().into_data().to_vec::<f32>().unwrap();
        let head_before = model.head.output.weight.val().into_data().to_vec::<f32>().unwrap();

        let outcome = Trainer::<AB>::new(&train, &valid, cfg.l2, device)
            .fit(model, &schedule(1, 0))
            .unwrap();

        assert_eq!(outcome.history.len(), 1);
        assert!(outcome.history[0].val_loss.is_nan());
        assert_eq!(outcome.learning_rate, 1e-3);

        let conv_after = outcome.model.backbone.convs[0].weight.val().into_data().to_vec::<f32>().unwrap();
        let head_after = outcome.model.head.output.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(conv_before, conv_after);
        assert_ne!(head_before, head_after);

        // Phase B flags: last two feature layers trainable
        assert_eq!(outcome.trainable.len(), FEATURE_LAYERS);
        assert_eq!(outcome.trainable.iter().filter(|t| **t).count(), 2);
    }

    #[test]
    fn test_both_phases_log_metrics() {
        let dir     = tempfile::tempdir().unwrap();
        let device  = NdArrayDevice::default();
        let pre     = Preprocessor::new(ImageSize::new(32, 32, 3));
        let samples = write_samples(dir.path(), 2);
        let train   = ImageStream::training(samples.clone(), pre, 2, 2, 7, true);
        let valid   = ImageStream::validation(samples, pre, 2, 2);
        let logger  = MetricsLogger::new(&dir.path().join("training")).unwrap();

        let cfg     = ClassifierConfig::new(Vgg16Config::new(32, 32, 3, false), 2);
        let outcome = Trainer::<AB>::new(&train, &valid, cfg.l2, device.clone())
            .with_metrics(&logger)
            .fit(cfg.init::<AB>(&device), &schedule(1, 1))
            .unwrap();

        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history[0].phase, "head");
        assert_eq!(outcome.history[1].phase, "fine_tune");
        assert!(outcome.history[1].val_loss.is_finite());

        let csv = std::fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
