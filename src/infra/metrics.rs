// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - phase:        "head" (frozen backbone) or "fine_tune"
//   - epoch:        the epoch number within the phase (1, 2, ...)
//   - loss:         mean training loss (cross-entropy + L2)
//   - accuracy:     fraction of training samples classified right
//   - val_loss:     mean validation loss
//   - val_accuracy: fraction of validation samples classified right
//   - lr:           learning rate used for the epoch
//
// Output file: <training.root_dir>/metrics.csv
//
// Example CSV output:
//   phase,epoch,loss,accuracy,val_loss,val_accuracy,lr
//   head,1,1.402113,0.281250,1.377240,0.312500,1e-2
//   fine_tune,1,1.210587,0.437500,1.250114,0.406250,1e-4
//
// Validation columns are NaN when there were no complete
// validation batches. The learning rate is written in
// scientific notation so plateau reductions stay readable.
// The file holds one training run: it is truncated when the
// logger is created.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const METRICS_FILE: &str = "metrics.csv";
const HEADER: &str = "phase,epoch,loss,accuracy,val_loss,val_accuracy,lr";

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub phase:        String,
    pub epoch:        usize,
    pub loss:         f64,
    pub accuracy:     f64,
    pub val_loss:     f64,
    pub val_accuracy: f64,
    pub lr:           f64,
}

impl EpochMetrics {
    fn to_csv_row(&self) -> String {
        format!(
            "{},{},{:.6},{:.6},{:.6},{:.6},{:e}",
            self.phase, self.epoch, self.loss, self.accuracy, self.val_loss, self.val_accuracy, self.lr,
        )
    }
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Starts a fresh CSV holding only the header. Rows from an
    /// earlier run are discarded.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join(METRICS_FILE);
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.to_csv_row())?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(phase: &str, epoch: usize) -> EpochMetrics {
        EpochMetrics {
            phase: phase.into(),
            epoch,
            loss: 1.5,
            accuracy: 0.25,
            val_loss: f64::NAN,
            val_accuracy: f64::NAN,
            lr: 0.01,
        }
    }

    fn lines(logger: &MetricsLogger) -> Vec<String> {
        fs::read_to_string(logger.csv_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_rows_appended_within_a_run() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&row("head", 1)).unwrap();
        logger.log(&row("fine_tune", 1)).unwrap();

        let lines = lines(&logger);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "head,1,1.500000,0.250000,NaN,NaN,1e-2");
        assert!(lines[2].starts_with("fine_tune,1,"));
    }

    #[test]
    fn test_new_run_truncates_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let first = MetricsLogger::new(dir.path()).unwrap();
        first.log(&row("head", 1)).unwrap();
        first.log(&row("head", 2)).unwrap();

        let second = MetricsLogger::new(dir.path()).unwrap();
        assert_eq!(lines(&second), vec![HEADER.to_string()]);

        second.log(&row("head", 1)).unwrap();
        let lines = lines(&second);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("head,1,"));
    }

    #[test]
    fn test_small_learning_rates_stay_distinct() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();

        let rates: Vec<f64> = (0..6).map(|k| 1e-4 * 0.5f64.powi(k)).collect();
        for (epoch, lr) in rates.iter().enumerate() {
            logger.log(&EpochMetrics { lr: *lr, ..row("fine_tune", epoch + 1) }).unwrap();
        }

        let logged: Vec<f64> = lines(&logger)[1..]
            .iter()
            .map(|l| l.rsplit(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(logged, rates);
        assert_eq!(lines(&logger)[1].rsplit(',').next().unwrap(), "1e-4");
    }
}
