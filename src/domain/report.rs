// ============================================================
// Layer 3 — Classification Report
// ============================================================
// Pure metric math over (y_true, y_pred) index sequences.
// No tensors, no I/O: the evaluator hands in two Vec<usize>
// and gets back plain numbers.
//
// Per class c:
//   precision = TP / (TP + FP)
//   recall    = TP / (TP + FN)
//   f1-score  = 2·P·R / (P + R)
//   support   = number of true samples of class c
//
// Aggregates:
//   macro    — unweighted mean over classes
//   weighted — mean weighted by support
//
// Any 0/0 yields 0.0.

use std::collections::BTreeMap;

use crate::domain::labels::ClassLabels;

// ─── ConfusionMatrix ──────────────────────────────────────────────────────────
/// `counts[t][p]` = samples of true class t predicted as p.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from index-aligned truth/prediction sequences.
    /// Indices at or beyond `num_classes` are ignored.
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize], num_classes: usize) -> Self {
        let mut counts = vec![vec![0usize; num_classes]; num_classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < num_classes && p < num_classes {
                counts[t][p] += 1;
            }
        }
        Self { counts }
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        self.counts[truth][predicted]
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn true_positives(&self, c: usize) -> usize {
        self.counts[c][c]
    }

    /// Column sum: everything predicted as c.
    fn predicted(&self, c: usize) -> usize {
        self.counts.iter().map(|row| row[c]).sum()
    }

    /// Row sum: everything that truly is c.
    fn support(&self, c: usize) -> usize {
        self.counts[c].iter().sum()
    }
}

// ─── ClassMetrics ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall:    f64,
    pub f1_score:  f64,
    pub support:   usize,
}

impl ClassMetrics {
    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("precision", self.precision),
            ("recall",    self.recall),
            ("f1-score",  self.f1_score),
            ("support",   self.support as f64),
        ]
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

// ─── ClassificationReport ─────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub per_class: Vec<(String, ClassMetrics)>,
    pub accuracy:  f64,
    pub macro_avg: ClassMetrics,
    pub weighted:  ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix, labels: &ClassLabels) -> Self {
        let n = cm.num_classes();

        let per_class: Vec<(String, ClassMetrics)> = (0..n)
            .map(|c| {
                let tp        = cm.true_positives(c) as f64;
                let precision = ratio(tp, cm.predicted(c) as f64);
                let recall    = ratio(tp, cm.support(c) as f64);
                let f1_score  = ratio(2.0 * precision * recall, precision + recall);
                let metrics   = ClassMetrics { precision, recall, f1_score, support: cm.support(c) };
                (labels.label(c).to_string(), metrics)
            })
            .collect();

        let total   = cm.total();
        let correct: usize = (0..n).map(|c| cm.true_positives(c)).sum();
        let accuracy = ratio(correct as f64, total as f64);

        let mean = |f: fn(&ClassMetrics) -> f64| {
            ratio(per_class.iter().map(|(_, m)| f(m)).sum(), n as f64)
        };
        let weighted_mean = |f: fn(&ClassMetrics) -> f64| {
            ratio(
                per_class.iter().map(|(_, m)| f(m) * m.support as f64).sum(),
                total as f64,
            )
        };

        let macro_avg = ClassMetrics {
            precision: mean(|m| m.precision),
            recall:    mean(|m| m.recall),
            f1_score:  mean(|m| m.f1_score),
            support:   total,
        };
        let weighted = ClassMetrics {
            precision: weighted_mean(|m| m.precision),
            recall:    weighted_mean(|m| m.recall),
            f1_score:  weighted_mean(|m| m.f1_score),
            support:   total,
        };

        Self { per_class, accuracy, macro_avg, weighted }
    }

    /// Flatten into `<label>_<metric>` keys, aggregates as `macro_*` and
    /// `weighted_*`, plus `accuracy`.
    pub fn to_score_entries(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        let groups = self
            .per_class
            .iter()
            .map(|(label, m)| (label.as_str(), m))
            .chain([("macro", &self.macro_avg), ("weighted", &self.weighted)]);

        for (label, metrics) in groups {
            for (metric, value) in metrics.entries() {
                out.insert(format!("{label}_{metric}"), value);
            }
        }
        out.insert("accuracy".to_string(), self.accuracy);
        out
    }
}

/// Final score map written to disk and sent to the tracker:
/// `loss` plus the report entries (the report's accuracy wins).
pub fn build_scores(loss: f64, report: &ClassificationReport) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    scores.insert("loss".to_string(), loss);
    scores.extend(report.to_score_entries());
    scores
}
