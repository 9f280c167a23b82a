// ============================================================
// Layer 5 — Classifier Model
// ============================================================
// Backbone: flatten → Linear(784, hidden) → ReLU
//                   → Linear(hidden, 10)  → ReLU
//
// Classifier wraps the backbone and carries the four step
// functions. Every step takes `&self`: only the optimizer,
// driven from `ml::step`, produces new parameters.

use burn::{
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::data::batcher::MnistBatch;
use crate::domain::mnist_item::{IMAGE_PIXELS, NUM_CLASSES};
use crate::domain::traits::{LogOptions, MetricSink};

#[derive(Config, Debug)]
pub struct ClassifierConfig {
    #[config(default = 128)]
    pub hidden_dim: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let backbone = Backbone {
            l1: LinearConfig::new(IMAGE_PIXELS, self.hidden_dim).init(device),
            l2: LinearConfig::new(self.hidden_dim, NUM_CLASSES).init(device),
        };
        Classifier { backbone }
    }
}

#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub l1: Linear<B>,
    pub l2: Linear<B>,
}

impl<B: Backend> Backbone<B> {
    /// [batch, 1, 28, 28] → [batch, 10]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, ..] = images.dims();
        let x = images.reshape([batch_size, IMAGE_PIXELS]);
        let x = relu(self.l1.forward(x));
        relu(self.l2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub backbone: Backbone<B>,
}

/// Loss plus what produced it, for metrics beyond the loss.
pub struct ClassificationOutput<B: Backend> {
    /// Shape: [1]
    pub loss:    Tensor<B, 1>,
    /// Shape: [batch, 10]
    pub output:  Tensor<B, 2>,
    /// Shape: [batch]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Classifier<B> {
    /// Class scores used for inference
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.backbone.forward(images)
    }

    pub fn forward_classification(&self, batch: MnistBatch<B>) -> ClassificationOutput<B> {
        let output = self.forward(batch.images);
        let loss   = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets.clone());

        ClassificationOutput { loss, output, targets: batch.targets }
    }

    // ─── Step functions ─────────────────────────────────────────────────────

    /// Loss of one training batch. Gradients are taken by the caller.
    pub fn training_step(
        &self,
        batch:      MnistBatch<B>,
        _batch_idx: usize,
        log:        &mut dyn MetricSink,
    ) -> Tensor<B, 1> {
        let loss = self.forward_classification(batch).loss;
        log.log("train_loss", scalar(&loss), LogOptions::BOTH);
        loss
    }

    pub fn validation_step(
        &self,
        batch:      MnistBatch<B>,
        _batch_idx: usize,
        log:        &mut dyn MetricSink,
    ) -> Tensor<B, 1> {
        let loss = self.forward_classification(batch).loss;
        log.log("valid_loss", scalar(&loss), LogOptions::BOTH);
        loss
    }

    pub fn test_step(
        &self,
        batch:      MnistBatch<B>,
        _batch_idx: usize,
        log:        &mut dyn MetricSink,
    ) -> Tensor<B, 1> {
        let out = self.forward_classification(batch);
        log.log("test_loss", scalar(&out.loss), LogOptions::EPOCH);
        log.log("test_acc", accuracy(out.output, out.targets), LogOptions::EPOCH);
        out.loss
    }

    pub fn predict_step(&self, batch: MnistBatch<B>, _batch_idx: usize) -> Tensor<B, 2> {
        self.forward(batch.images)
    }
}

/// Read a one-element tensor back as f64
pub fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

/// Fraction of rows whose argmax equals the target
pub fn accuracy<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let total = targets.dims()[0];
    if total == 0 {
        return 0.0;
    }
    // argmax(1) returns [batch, 1]; flatten to [batch] before comparing
    let predicted = output.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem::<i64>();
    correct as f64 / total as f64
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::NullSink;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn random_batch<B: Backend>(n: usize, device: &B::Device) -> MnistBatch<B> {
        let labels: Vec<i32> = (0..n as i32).map(|i| i % 10).collect();
        MnistBatch {
            images:  Tensor::random([n, 1, 28, 28], Distribution::Uniform(0.0, 1.0), device),
            targets: Tensor::from_ints(labels.as_slice(), device),
        }
    }

    #[derive(Default)]
    struct Recorded(Vec<(String, f64, LogOptions)>);

    impl MetricSink for Recorded {
        fn log(&mut self, name: &str, value: f64, options: LogOptions) {
            self.0.push((name.to_string(), value, options));
        }
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model  = ClassifierConfig::new().init::<TestBackend>(&device);
        for n in [1, 4, 32] {
            let out = model.forward(random_batch::<TestBackend>(n, &device).images);
            assert_eq!(out.dims(), [n, 10]);
        }
    }

    #[test]
    fn test_training_step_returns_non_negative_scalar() {
        let device = Default::default();
        let model  = ClassifierConfig::new().init::<Autodiff<TestBackend>>(&device);
        let loss   = model.training_step(random_batch(8, &device), 0, &mut NullSink);

        assert_eq!(loss.dims(), [1]);
        assert!(scalar(&loss) >= 0.0);
        // a graph was recorded, so gradients can be taken
        let _grads = loss.backward();
    }

    #[test]
    fn test_steps_log_named_metrics() {
        let device  = Default::default();
        let model   = ClassifierConfig::new().init::<TestBackend>(&device);
        let mut log = Recorded::default();

        model.validation_step(random_batch(4, &device), 0, &mut log);
        model.test_step(random_batch(4, &device), 0, &mut log);
        let preds = model.predict_step(random_batch(4, &device), 0);

        let names: Vec<_> = log.0.iter().map(|(n, ..)| n.as_str()).collect();
        assert_eq!(names, vec!["valid_loss", "test_loss", "test_acc"]);
        assert_eq!(preds.dims(), [4, 10]);
    }

    #[test]
    fn test_train_loss_logged_per_step_and_epoch() {
        let device  = Default::default();
        let model   = ClassifierConfig::new().init::<Autodiff<TestBackend>>(&device);
        let mut log = Recorded::default();

        model.training_step(random_batch(4, &device), 0, &mut log);
        assert_eq!(log.0.len(), 1);
        let (name, _, options) = &log.0[0];
        assert_eq!(name, "train_loss");
        assert_eq!(*options, LogOptions::BOTH);
    }

    #[test]
    fn test_accuracy() {
        let device  = Default::default();
        let output  = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 0, 0], &device);
        assert!((accuracy(output, targets) - 2.0 / 3.0).abs() < 1e-9);
    }
}
