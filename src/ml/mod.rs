// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that needs autodiff or optimizers lives here.
//
//   model.rs   — Backbone MLP, the Classifier and its four
//                step functions (train / validate / test /
//                predict)
//
//   step.rs    — How a training batch becomes a parameter
//                update: automatic (with gradient
//                accumulation) or manual optimization
//
//   trainer.rs — The fit / validate / test / predict driver:
//                batch limits, checkpoints, metrics, profiler

/// Classifier architecture and step functions
pub mod model;

/// Optimization-mode dispatch for training steps
pub mod step;

/// Stage driver with checkpointing and metrics
pub mod trainer;
