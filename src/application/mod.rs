// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per pipeline stage, plus prediction and the
// driver that sequences the stages:
//
//   ingest_use_case   — Stage 1: download + unzip the dataset
//   prepare_use_case  — Stage 2: VGG16 backbone + new head
//   train_use_case    — Stage 3: head phase, then fine-tuning
//   evaluate_use_case — Stage 4: scores, plot, tracking run
//   predict_use_case  — single-image inference
//   pipeline          — runs the stages in order
//
// Rules for this layer:
//   - No ML math or model code here (Layer 5)
//   - No HTTP or argument parsing here (Layer 1)
//   - Only workflow coordination
//
// Each use case takes its config record by value in `new`
// and does its work in `execute`.

pub mod ingest_use_case;
pub mod prepare_use_case;
pub mod train_use_case;
pub mod evaluate_use_case;
pub mod predict_use_case;
pub mod pipeline;
