// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Scores a trained model on an evaluation stream: fixed order,
// no augmentation, last partial batch kept, so every sample is
// visited exactly once.
//
//   loss      sample-weighted mean of the batch losses
//   accuracy  correct / total
//   y_pred    arg-max of the softmax output per sample
//   y_true    the stream's own label order
//
// Because the stream is never shuffled, y_true[i] and
// y_pred[i] always describe the same file.

use anyhow::{ensure, Result};
use burn::prelude::*;
use std::collections::BTreeMap;

use crate::data::stream::ImageStream;
use crate::domain::labels::ClassLabels;
use crate::domain::report::{build_scores, ClassificationReport, ConfusionMatrix};
use crate::ml::model::{predicted_classes, CtScanClassifier};

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss:     f64,
    pub accuracy: f64,
    pub y_true:   Vec<usize>,
    pub y_pred:   Vec<usize>,
}

impl Evaluation {
    pub fn confusion_matrix(&self, num_classes: usize) -> ConfusionMatrix {
        ConfusionMatrix::from_predictions(&self.y_true, &self.y_pred, num_classes)
    }

    pub fn report(&self, labels: &ClassLabels) -> ClassificationReport {
        ClassificationReport::from_confusion(&self.confusion_matrix(labels.len()), labels)
    }

    /// The flat score map written to the score file.
    pub fn scores(&self, labels: &ClassLabels) -> BTreeMap<String, f64> {
        build_scores(self.loss, &self.report(labels))
    }
}

pub fn evaluate<B: Backend>(
    model:  &CtScanClassifier<B>,
    stream: &ImageStream,
    l2:     f64,
    device: &B::Device,
) -> Result<Evaluation> {
    ensure!(!stream.is_empty(), "Evaluation set is empty");

    let mut loss_sum = 0.0f64;
    let mut y_true   = Vec::with_capacity(stream.len());
    let mut y_pred   = Vec::with_capacity(stream.len());

    for (step, batch) in stream.batches::<B>(0, device).enumerate() {
        let batch = batch?;
        let n     = batch.labels.len();
        let (loss, logits) = model.forward_loss(batch.images, batch.targets, l2);

        loss_sum += loss.into_scalar().elem::<f64>() * n as f64;
        y_pred.extend(predicted_classes(logits)?);
        y_true.extend(batch.labels);

        tracing::debug!("Evaluated batch {}/{}", step + 1, stream.steps_per_epoch());
    }

    ensure!(
        y_true == stream.labels(),
        "Evaluation order diverged from the stream's label order"
    );

    let total    = y_true.len();
    let correct  = y_true.iter().zip(&y_pred).filter(|(t, p)| t == p).count();
    let accuracy = correct as f64 / total as f64;
    let loss     = loss_sum / total as f64;

    tracing::info!("Evaluation: {} images | loss={:.4} | accuracy={:.4}", total, loss, accuracy);
    Ok(Evaluation { loss, accuracy, y_true, y_pred })
}
