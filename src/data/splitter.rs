// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Splits an indexed image folder into training and validation
// subsets, per class and without randomness:
//
//   class with n sorted files
//   ├── first floor(fraction · n) files → validation
//   └── the rest                        → training
//
// Why per class and deterministic?
//   Every class keeps the same proportion in both subsets,
//   and re-running Stage 3 on the same tree always produces
//   the same split. Shuffling happens later, per epoch, in
//   the training stream only.
//
// Default fraction: 0.2 (80% training, 20% validation)
//
// Reference: Rust Book §8 (Vectors)

use crate::data::loader::ImageSample;

pub const VALIDATION_SPLIT: f64 = 0.2;

/// Split `samples` (grouped by label, sorted within each group) into
/// (train, validation).
///
/// # Example
/// ```ignore
/// let (train, val) = split_train_val(folder.samples, 4, 0.2);
/// // 10 images per class → 8 train + 2 validation per class
/// ```
pub fn split_train_val(
    samples:             Vec<ImageSample>,
    num_classes:         usize,
    validation_fraction: f64,
) -> (Vec<ImageSample>, Vec<ImageSample>) {
    let mut by_class: Vec<Vec<ImageSample>> = vec![Vec::new(); num_classes];
    for s in samples {
        if s.label < num_classes {
            by_class[s.label].push(s);
        }
    }

    let mut train = Vec::new();
    let mut val   = Vec::new();

    for mut group in by_class {
        let n_val = ((group.len() as f64) * validation_fraction).floor() as usize;
        // split_off(n) leaves [0..n) in `group`, returns [n..)
        let rest = group.split_off(n_val.min(group.len()));
        val.extend(group);
        train.extend(rest);
    }

    let total = train.len() + val.len();
    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        train.len(),
        val.len(),
        (train.len() * 100) / total.max(1),
        (val.len()   * 100) / total.max(1),
    );

    (train, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn samples(per_class: &[usize]) -> Vec<ImageSample> {
        per_class
            .iter()
            .enumerate()
            .flat_map(|(label, &n)| {
                (0..n).map(move |i| ImageSample {
                    path: PathBuf::from(format!("c{label}/{i:03}.png")),
                    label,
                })
            })
            .collect()
    }

    #[test]
    fn test_per_class_floor_split() {
        let (train, val) = split_train_val(samples(&[10, 7]), 2, 0.2);
        // 10 → 2 val, 7 → floor(1.4) = 1 val
        assert_eq!(val.len(), 3);
        assert_eq!(train.len(), 14);
    }

    #[test]
    fn test_first_files_go_to_validation() {
        let (train, val) = split_train_val(samples(&[5]), 1, 0.2);
        assert_eq!(val[0].path, PathBuf::from("c0/000.png"));
        assert_eq!(train[0].path, PathBuf::from("c0/001.png"));
    }

    #[test]
    fn test_same_input_same_split() {
        let a = split_train_val(samples(&[9, 4, 6]), 3, 0.2);
        let b = split_train_val(samples(&[9, 4, 6]), 3, 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tiny_class_keeps_everything_for_training() {
        let (train, val) = split_train_val(samples(&[4]), 1, 0.2);
        assert!(val.is_empty());
        assert_eq!(train.len(), 4);
    }

    #[test]
    fn test_empty_dataset() {
        let (train, val) = split_train_val(Vec::new(), 4, 0.2);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
