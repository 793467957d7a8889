// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that define what the system
// talks about: class labels, classification metrics, and the
// abstractions for classifiers and experiment trackers.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O or network calls
//
// Everything here is unit-testable without a backend.

// Index → label table, with the "Unknown" fallback
pub mod labels;

// Confusion matrix and per-class precision/recall/F1
pub mod report;

// ImageClassifier and ExperimentTracker
pub mod traits;
