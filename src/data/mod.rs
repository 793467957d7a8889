// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from an image tree on disk
// all the way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   class_a/ class_b/ ... (directory of labeled images)
//       │
//       ▼
//   ImageFolder       → indexes (path, class) pairs, sorted
//       │
//       ▼
//   split_train_val   → holds out a fixed share per class
//       │
//       ▼
//   ImageStream       → epoch order, seeded shuffle, steps
//       │
//       ▼
//   Preprocessor      → decode, resize, rescale to [0, 1]
//   Augmenter         → random affine jitter (training only)
//       │
//       ▼
//   ImageBatcher      → stacks samples into tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Indexes a class-per-directory image tree
pub mod loader;

/// Decodes, resizes and rescales images
pub mod preprocessor;

/// Random geometric augmentation for training images
pub mod augment;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Per-class train/validation split
pub mod splitter;

/// Epoch iteration: ordering, shuffling, step counts
pub mod stream;
