// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command. No model
// math lives here; the trainer (Layer 5) owns the loops and
// the data module (Layer 4) owns the files.

/// Tensor creation demo
pub mod tensor_demo;

/// fit / validate / test / predict / run workflows
pub mod run_use_case;
