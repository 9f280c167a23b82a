// ============================================================
// Layer 3 — Stages and Phases
// ============================================================
// A *stage* is what the user asked the trainer to do
// (`fit`, `validate`, `test`, `predict`).
// A *phase* is which step function runs on a batch.
// `fit` runs two phases: train and validate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a run is doing. Passed to `DataModule::setup` so the
/// data module only loads the splits it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Fit,
    Validate,
    Test,
    Predict,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fit      => "fit",
            Stage::Validate => "validate",
            Stage::Test     => "test",
            Stage::Predict  => "predict",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step function is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Validate,
    Test,
    Predict,
}

impl Phase {
    /// Name used for profiler actions, e.g. `training_step`
    pub fn step_name(&self) -> &'static str {
        match self {
            Phase::Train    => "training_step",
            Phase::Validate => "validation_step",
            Phase::Test     => "test_step",
            Phase::Predict  => "predict_step",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Fit.to_string(), "fit");
        assert_eq!(Stage::Predict.to_string(), "predict");
    }

    #[test]
    fn test_phase_step_names() {
        assert_eq!(Phase::Train.step_name(), "training_step");
        assert_eq!(Phase::Validate.step_name(), "validation_step");
    }
}
