// ============================================================
// Layer 5 — Fit Callbacks
// ============================================================
// The two epoch-end hooks used while fine-tuning. Both watch
// the validation loss (lower is better) and count epochs
// without improvement:
//
//   improvement := val_loss < best − min_delta
//
//   EarlyStopping       patience 5, min_delta 0
//     improvement → best = val_loss, wait = 0, snapshot model
//     otherwise   → wait += 1; stop once wait ≥ patience
//
//   ReduceLrOnPlateau   patience 3, factor 0.5, min_delta 1e-4
//     improvement → best = val_loss, wait = 0
//     otherwise   → wait += 1; once wait ≥ patience the
//                   learning rate is multiplied by factor
//                   (never below min_lr) and wait resets
//
// `best` starts at +∞, so the first epoch always improves.
// A NaN loss never counts as an improvement.

/// Stops training when the monitored loss stops improving and
/// keeps a snapshot of the best model seen.
#[derive(Debug)]
pub struct EarlyStopping<M> {
    patience:   usize,
    min_delta:  f64,
    best:       f64,
    wait:       usize,
    best_epoch: Option<usize>,
    best_state: Option<M>,
    stopped_at: Option<usize>,
}

impl<M: Clone> EarlyStopping<M> {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta: min_delta.abs(),
            best: f64::INFINITY,
            wait: 0,
            best_epoch: None,
            best_state: None,
            stopped_at: None,
        }
    }

    /// Returns true when training should stop after `epoch`.
    pub fn on_epoch_end(&mut self, epoch: usize, val_loss: f64, state: &M) -> bool {
        if val_loss < self.best - self.min_delta {
            self.best       = val_loss;
            self.wait       = 0;
            self.best_epoch = Some(epoch);
            self.best_state = Some(state.clone());
            return false;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_at = Some(epoch);
            return true;
        }
        false
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_at(&self) -> Option<usize> {
        self.stopped_at
    }

    /// The snapshot taken at the best epoch, if any epoch improved.
    pub fn into_best(self) -> Option<M> {
        self.best_state
    }
}

impl<M: Clone> Default for EarlyStopping<M> {
    fn default() -> Self {
        Self::new(5, 0.0)
    }
}

/// Halves the learning rate when the monitored loss plateaus.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor:    f64,
    patience:  usize,
    min_delta: f64,
    min_lr:    f64,
    best:      f64,
    wait:      usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_delta: f64) -> Self {
        Self { factor, patience, min_delta, min_lr: 0.0, best: f64::INFINITY, wait: 0 }
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Learning rate to use for the next epoch.
    pub fn on_epoch_end(&mut self, val_loss: f64, lr: f64) -> f64 {
        if val_loss < self.best - self.min_delta {
            self.best = val_loss;
            self.wait = 0;
            return lr;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.wait = 0;
            if lr > self.min_lr {
                let new_lr = (lr * self.factor).max(self.min_lr);
                tracing::info!("ReduceLROnPlateau reducing learning rate to {:e}", new_lr);
                return new_lr;
            }
        }
        lr
    }
}

impl Default for ReduceLrOnPlateau {
    fn default() -> Self {
        Self::new(0.5, 3, 1e-4)
    }
}
