// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches disks and networks on behalf of the
// other layers:
//
//   files.rs      — mkdir -p, JSON writing, size strings
//   downloader.rs — drive-style file download (reqwest)
//   archive.rs    — zip extraction
//   checkpoint.rs — model store: burn record + JSON manifest,
//                   saved with CompactRecorder
//   metrics.rs    — per-epoch metrics CSV
//   plot.rs       — confusion-matrix PNG
//   tracking/     — experiment runs: local ./mlruns store or
//                   a remote MLflow server
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

pub mod files;
pub mod downloader;
pub mod archive;

/// Model record + manifest persistence
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

pub mod plot;
pub mod tracking;
