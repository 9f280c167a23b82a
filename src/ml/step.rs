// ============================================================
// Layer 5 — Training Step Dispatch
// ============================================================
// One place decides how a training batch turns into new
// parameters, based on `OptimizationMode`:
//
//   Automatic → the trainer owns backward + optimizer step.
//               Gradients can be accumulated over several
//               batches before the optimizer runs; each loss
//               is scaled by 1/N so the update is their mean.
//   Manual    → the step itself runs backward and the
//               optimizer on every batch; accumulation does
//               not apply.
//
// Validation, test and predict never come through here: they
// run on `model.valid()` and cannot touch the parameters.

use burn::{
    optim::{GradientsAccumulator, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::MnistBatch;
use crate::domain::{stage::Phase, traits::MetricSink};
use crate::infra::profiler::Profiler;
use crate::ml::model::{scalar, Classifier};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationMode {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Adam with Burn's defaults
    #[default]
    Adam,
    /// SGD with momentum 0.9
    Sgd,
}

/// Holds the optimizer across steps, plus any gradients that
/// have been accumulated but not yet applied.
pub struct TrainStepper<B: AutodiffBackend, O> {
    optim:       O,
    lr:          f64,
    mode:        OptimizationMode,
    accumulate:  usize,
    accumulator: GradientsAccumulator<Classifier<B>>,
    pending:     usize,
}

impl<B, O> TrainStepper<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Classifier<B>, B>,
{
    pub fn new(optim: O, lr: f64, mode: OptimizationMode, accumulate_grad_batches: usize) -> Self {
        Self {
            optim,
            lr,
            mode,
            accumulate:  accumulate_grad_batches.max(1),
            accumulator: GradientsAccumulator::new(),
            pending:     0,
        }
    }

    /// Run one training batch. Returns the (possibly updated)
    /// model and the batch loss.
    pub fn step(
        &mut self,
        model:     Classifier<B>,
        batch:     MnistBatch<B>,
        batch_idx: usize,
        log:       &mut dyn MetricSink,
        profiler:  &mut Profiler,
    ) -> (Classifier<B>, f64) {
        let action = Phase::Train.step_name();

        match self.mode {
            OptimizationMode::Automatic => {
                let loss  = profiler.profile(action, || model.training_step(batch, batch_idx, log));
                let value = scalar(&loss);

                // N accumulated batches make one averaged update
                let scaled = loss.div_scalar(self.accumulate as f64);
                let grads  = profiler.profile("backward", || scaled.backward());
                let grads  = GradientsParams::from_grads(grads, &model);
                self.accumulator.accumulate(&model, grads);
                self.pending += 1;

                if self.pending < self.accumulate {
                    return (model, value);
                }
                (self.apply(model, profiler), value)
            }
            OptimizationMode::Manual => {
                let (optim, lr) = (&mut self.optim, self.lr);
                profiler.profile(action, || {
                    let loss  = model.training_step(batch, batch_idx, log);
                    let value = scalar(&loss);
                    let grads = GradientsParams::from_grads(loss.backward(), &model);
                    (optim.step(lr, model, grads), value)
                })
            }
        }
    }

    /// Apply gradients still waiting at the end of an epoch.
    pub fn finish_epoch(&mut self, model: Classifier<B>, profiler: &mut Profiler) -> Classifier<B> {
        if self.pending == 0 {
            return model;
        }
        self.apply(model, profiler)
    }

    fn apply(&mut self, model: Classifier<B>, profiler: &mut Profiler) -> Classifier<B> {
        let grads = self.accumulator.grads();
        self.pending = 0;
        let (optim, lr) = (&mut self.optim, self.lr);
        profiler.profile("optimizer_step", || optim.step(lr, model, grads))
    }
}
