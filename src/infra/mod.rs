// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns the trainer leans on:
//
//   checkpoint.rs — Saving and loading classifier weights with
//                   Burn's CompactRecorder, plus best/last
//                   pointers and the model config as JSON.
//
//   metrics.rs    — The MetricSink step functions log into;
//                   writes per-step and per-epoch rows to CSV.
//
//   profiler.rs   — Wall-clock timing of named actions, with an
//                   optional Chrome trace export.

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Step timing and trace export
pub mod profiler;
