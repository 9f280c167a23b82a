// ============================================================
// Layer 5 — Trainer
// ============================================================
// Drives the classifier through the four stages:
//
//   fit      → epochs of training + validation, a checkpoint
//              per epoch, best.json tracking the lowest
//              validation loss
//   validate → one validation pass with saved weights
//   test     → one pass over the test split
//   predict  → class scores for the test split
//
// Training runs on the autodiff backend B. Every evaluation
// stage runs on B::InnerBackend via model.valid(), so no
// graph is recorded and no parameter can change.
//
// Batch limits, gradient accumulation and the profiler are
// all trainer configuration; the model and the data module
// only supply step functions and loaders.
//
// One epoch of `fit`:
//
//   1. train   take(limit_train_batches) batches from the
//              shuffled loader, TrainStepper::step on each
//   2. flush   apply any gradients still accumulated
//   3. valid   model.valid() on take(limit_val_batches)
//              batches, valid_loss per step and per epoch
//   4. record  epoch means → metrics.csv, epoch line on
//              stdout
//   5. save    epoch_<n>.mpk + last.json, and best.json if
//              valid_loss improved
//
// Why two backends in one trainer?
//   - B (autodiff) records the graph backward() needs
//   - B::InnerBackend has no graph, so evaluation is faster
//     and cannot produce gradients by accident
//
// Reference: Burn Book §5 (Training)
//            Kingma & Ba (2015) Adam

use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, AdamConfig, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::data::datamodule::{MnistDataModule, MnistLoader};
use crate::domain::{
    stage::{Phase, Stage},
    traits::DataModule,
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointPointer, CheckpointRef},
    metrics::{EpochMetrics, MetricLogger},
    profiler::{Profiler, ProfilerKind},
};
use crate::ml::{
    model::{Classifier, ClassifierConfig},
    step::{OptimizationMode, OptimizerKind, TrainStepper},
};

// ─── BatchLimit ───────────────────────────────────────────────────────────────
/// How many batches of a loader a stage may consume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum BatchLimit {
    #[default]
    All,
    Count(usize),
    /// Fraction of the loader in (0, 1]
    Fraction(f64),
}

impl BatchLimit {
    pub fn resolve(&self, available: usize) -> usize {
        match *self {
            BatchLimit::All         => available,
            BatchLimit::Count(n)    => n.min(available),
            // floor, but never zero while there is data
            BatchLimit::Fraction(f) => ((available as f64 * f) as usize).clamp(available.min(1), available),
        }
    }
}

impl FromStr for BatchLimit {
    type Err = String;

    /// `"3"` → three batches, `"0.25"` → a quarter, `"1.0"` / `"all"` → everything
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(BatchLimit::All);
        }
        if let Ok(n) = s.parse::<usize>() {
            return Ok(BatchLimit::Count(n));
        }
        match s.parse::<f64>() {
            Ok(f) if f == 1.0 => Ok(BatchLimit::All),
            Ok(f) if f > 0.0 && f < 1.0 => Ok(BatchLimit::Fraction(f)),
            _ => Err(format!("'{s}' is neither a batch count nor a fraction in (0, 1]")),
        }
    }
}

impl fmt::Display for BatchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchLimit::All         => f.write_str("all"),
            BatchLimit::Count(n)    => write!(f, "{n}"),
            BatchLimit::Fraction(x) => write!(f, "{x}"),
        }
    }
}

// ─── TrainerConfig ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub max_epochs:              usize,
    pub limit_train_batches:     BatchLimit,
    pub limit_val_batches:       BatchLimit,
    pub limit_test_batches:      BatchLimit,
    pub limit_predict_batches:   BatchLimit,
    pub accumulate_grad_batches: usize,
    pub log_every_n_steps:       usize,
    /// Checkpoints, metrics and profiler traces go here
    pub default_root_dir:        PathBuf,
    pub profiler:                Option<ProfilerKind>,
    pub optimization:            OptimizationMode,
    pub optimizer:               OptimizerKind,
    /// Seeds parameter initialisation
    pub seed:                    u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs:              10,
            limit_train_batches:     BatchLimit::All,
            limit_val_batches:       BatchLimit::All,
            limit_test_batches:      BatchLimit::All,
            limit_predict_batches:   BatchLimit::All,
            accumulate_grad_batches: 1,
            log_every_n_steps:       50,
            default_root_dir:        PathBuf::from("runs"),
            profiler:                None,
            optimization:            OptimizationMode::Automatic,
            optimizer:               OptimizerKind::Adam,
            seed:                    1234,
        }
    }
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub epochs:          Vec<EpochMetrics>,
    pub best_epoch:      usize,
    pub best_checkpoint: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub batches:  usize,
    pub loss:     Option<f64>,
    pub accuracy: Option<f64>,
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B: AutodiffBackend> {
    config:      TrainerConfig,
    device:      B::Device,
    checkpoints: CheckpointManager,
    metrics:     MetricLogger,
    profiler:    Profiler,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainerConfig, device: B::Device) -> Result<Self> {
        if config.max_epochs == 0 {
            bail!("max_epochs must be at least 1");
        }

        let root        = config.default_root_dir.clone();
        let checkpoints = CheckpointManager::new(root.join("checkpoints"))?;
        let metrics     = MetricLogger::new(&root, config.log_every_n_steps)?;
        let profiler    = match config.profiler {
            Some(kind) => Profiler::new(kind, &root),
            None       => Profiler::disabled(),
        };

        B::seed(config.seed);
        tracing::info!(
            "Trainer ready on {:?}, writing to '{}' (metrics: '{}')",
            device,
            root.display(),
            metrics.csv_path().display()
        );

        Ok(Self { config, device, checkpoints, metrics, profiler })
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    // ─── fit ────────────────────────────────────────────────────────────────

    /// Train `model` and return it together with a summary of
    /// every epoch and where the best weights were saved.
    pub fn fit(
        &mut self,
        model:        Classifier<B>,
        model_config: &ClassifierConfig,
        datamodule:   &mut MnistDataModule,
    ) -> Result<(Classifier<B>, FitOutcome)> {
        datamodule.prepare_data()?;
        datamodule.setup(Some(Stage::Fit))?;
        self.checkpoints.save_config(model_config)?;

        let train_loader = datamodule.train_dataloader::<B>(&self.device)?;
        let val_loader   = datamodule.val_dataloader::<B::InnerBackend>(&self.device)?;
        let lr           = model_config.learning_rate;

        tracing::info!(
            "Fitting for {} epoch(s): {} train / {} validation batches per epoch ({:?} optimization, {:?})",
            self.config.max_epochs,
            self.config.limit_train_batches.resolve(train_loader.num_batches()),
            self.config.limit_val_batches.resolve(val_loader.num_batches()),
            self.config.optimization,
            self.config.optimizer,
        );

        match self.config.optimizer {
            OptimizerKind::Adam => {
                let optim = AdamConfig::new().init::<B, Classifier<B>>();
                self.fit_loop(model, optim, lr, &train_loader, &val_loader)
            }
            OptimizerKind::Sgd => {
                let momentum = MomentumConfig::new().with_momentum(0.9).with_dampening(0.0);
                let optim    = SgdConfig::new()
                    .with_momentum(Some(momentum))
                    .init::<B, Classifier<B>>();
                self.fit_loop(model, optim, lr, &train_loader, &val_loader)
            }
        }
    }

    fn fit_loop<O: Optimizer<Classifier<B>, B>>(
        &mut self,
        mut model:    Classifier<B>,
        optim:        O,
        lr:           f64,
        train_loader: &MnistLoader<B>,
        val_loader:   &MnistLoader<B::InnerBackend>,
    ) -> Result<(Classifier<B>, FitOutcome)> {
        let n_train = self.config.limit_train_batches.resolve(train_loader.num_batches());
        let n_val   = self.config.limit_val_batches.resolve(val_loader.num_batches());

        let mut stepper = TrainStepper::new(
            optim,
            lr,
            self.config.optimization,
            self.config.accumulate_grad_batches,
        );

        let mut epochs      = Vec::with_capacity(self.config.max_epochs);
        let mut best: Option<CheckpointPointer> = None;
        let mut global_step = 0usize;

        for epoch in 1..=self.config.max_epochs {
            // ── Training phase ──────────────────────────────────────────────
            self.metrics.begin_epoch(Stage::Fit, epoch);

            for (batch_idx, batch) in train_loader.iter().take(n_train).enumerate() {
                self.metrics.set_step(global_step);
                let (updated, _loss) = stepper.step(
                    model, batch, batch_idx, &mut self.metrics, &mut self.profiler,
                );
                model = updated;
                global_step += 1;
            }
            model = stepper.finish_epoch(model, &mut self.profiler);

            // ── Validation phase ────────────────────────────────────────────
            // model.valid() → Classifier<B::InnerBackend>, no autodiff
            let model_valid = model.valid();
            for (batch_idx, batch) in val_loader.iter().take(n_val).enumerate() {
                let metrics = &mut self.metrics;
                self.profiler.profile(Phase::Validate.step_name(), || {
                    model_valid.validation_step(batch, batch_idx, metrics)
                });
            }

            let means = self.metrics.end_epoch()?;
            let row   = EpochMetrics::new(
                epoch,
                means.get("train_loss").copied(),
                means.get("valid_loss").copied(),
            );

            println!(
                "Epoch {:>3}/{} | train_loss={} | valid_loss={}",
                epoch,
                self.config.max_epochs,
                fmt_loss(row.train_loss),
                fmt_loss(row.valid_loss),
            );

            self.checkpoints.save_model(&model, epoch, row.valid_loss)?;
            if row.is_improvement(best.and_then(|b| b.valid_loss)) {
                let pointer = CheckpointPointer { epoch, valid_loss: row.valid_loss };
                self.checkpoints.mark_best(pointer)?;
                best = Some(pointer);
            }
            epochs.push(row);
        }

        self.profiler.finish_stage(Stage::Fit)?;

        let best_epoch = best.map(|b| b.epoch).unwrap_or(self.config.max_epochs);
        tracing::info!("Fit complete, best epoch {}", best_epoch);

        Ok((model, FitOutcome {
            epochs,
            best_epoch,
            best_checkpoint: self.checkpoints.epoch_path(best_epoch),
        }))
    }

    // ─── validate / test / predict ──────────────────────────────────────────

    /// Mean validation loss of the saved weights
    pub fn validate(&mut self, ckpt: &CheckpointRef, datamodule: &mut MnistDataModule) -> Result<Option<f64>> {
        datamodule.prepare_data()?;
        datamodule.setup(Some(Stage::Validate))?;
        let model  = self.load_inner(ckpt)?;
        let loader = datamodule.val_dataloader::<B::InnerBackend>(&self.device)?;
        let n_val  = self.config.limit_val_batches.resolve(loader.num_batches());

        self.metrics.begin_epoch(Stage::Validate, 0);
        for (batch_idx, batch) in loader.iter().take(n_val).enumerate() {
            let metrics = &mut self.metrics;
            self.profiler.profile(Phase::Validate.step_name(), || {
                model.validation_step(batch, batch_idx, metrics)
            });
        }
        let means = self.metrics.end_epoch()?;
        self.profiler.finish_stage(Stage::Validate)?;

        let loss = means.get("valid_loss").copied();
        println!("Validate | valid_loss={}", fmt_loss(loss));
        Ok(loss)
    }

    pub fn test(&mut self, ckpt: &CheckpointRef, datamodule: &mut MnistDataModule) -> Result<TestOutcome> {
        datamodule.prepare_data()?;
        datamodule.setup(Some(Stage::Test))?;
        let model  = self.load_inner(ckpt)?;
        let loader = datamodule.test_dataloader::<B::InnerBackend>(&self.device)?;
        let n_test = self.config.limit_test_batches.resolve(loader.num_batches());

        self.metrics.begin_epoch(Stage::Test, 0);
        let mut batches = 0usize;
        for (batch_idx, batch) in loader.iter().take(n_test).enumerate() {
            let metrics = &mut self.metrics;
            self.profiler.profile(Phase::Test.step_name(), || {
                model.test_step(batch, batch_idx, metrics)
            });
            batches += 1;
        }
        let means = self.metrics.end_epoch()?;
        self.profiler.finish_stage(Stage::Test)?;

        let outcome = TestOutcome {
            batches,
            loss:     means.get("test_loss").copied(),
            accuracy: means.get("test_acc").copied(),
        };
        println!(
            "Test | test_loss={} | test_acc={}",
            fmt_loss(outcome.loss),
            outcome.accuracy.map(|a| format!("{:.1}%", a * 100.0)).unwrap_or_else(|| "n/a".into()),
        );
        Ok(outcome)
    }

    /// One `[batch, 10]` score tensor per predict batch
    pub fn predict(
        &mut self,
        ckpt:       &CheckpointRef,
        datamodule: &mut MnistDataModule,
    ) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
        datamodule.prepare_data()?;
        datamodule.setup(Some(Stage::Predict))?;
        let model  = self.load_inner(ckpt)?;
        let loader = datamodule.predict_dataloader::<B::InnerBackend>(&self.device)?;
        let n_pred = self.config.limit_predict_batches.resolve(loader.num_batches());

        let mut predictions = Vec::with_capacity(n_pred);
        for (batch_idx, batch) in loader.iter().take(n_pred).enumerate() {
            let scores = self.profiler.profile(Phase::Predict.step_name(), || {
                model.predict_step(batch, batch_idx)
            });
            predictions.push(scores);
        }
        self.profiler.finish_stage(Stage::Predict)?;

        tracing::info!("Predicted {} batch(es)", predictions.len());
        Ok(predictions)
    }

    fn load_inner(&self, ckpt: &CheckpointRef) -> Result<Classifier<B::InnerBackend>> {
        let cfg   = self.checkpoints.load_config()?;
        let path  = self.checkpoints.resolve(ckpt)?;
        let model = cfg.init::<B::InnerBackend>(&self.device);
        self.checkpoints.load_model(model, &path, &self.device)
    }
}

fn fmt_loss(loss: Option<f64>) -> String {
    loss.map(|l| format!("{l:.4}")).unwrap_or_else(|| "n/a".to_string())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{datamodule::DataModuleConfig, source::DatasetSource};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn datamodule(dir: &std::path::Path) -> MnistDataModule {
        MnistDataModule::new(DataModuleConfig {
            data_dir:    dir.join("data"),
            val_split:   16,
            num_workers: 1,
            batch_size:  8,
            source:      DatasetSource::mock(64, 24),
            ..Default::default()
        })
        .unwrap()
    }

    fn trainer_config(dir: &std::path::Path) -> TrainerConfig {
        TrainerConfig {
            max_epochs:       2,
            default_root_dir: dir.join("runs"),
            log_every_n_steps: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_limit_parse() {
        assert_eq!("3".parse::<BatchLimit>().unwrap(), BatchLimit::Count(3));
        assert_eq!("0.25".parse::<BatchLimit>().unwrap(), BatchLimit::Fraction(0.25));
        assert_eq!("1.0".parse::<BatchLimit>().unwrap(), BatchLimit::All);
        assert_eq!("all".parse::<BatchLimit>().unwrap(), BatchLimit::All);
        assert!("1.5".parse::<BatchLimit>().is_err());
        assert!("-1".parse::<BatchLimit>().is_err());
        assert!("abc".parse::<BatchLimit>().is_err());
    }

    #[test]
    fn test_batch_limit_resolve() {
        assert_eq!(BatchLimit::All.resolve(10), 10);
        assert_eq!(BatchLimit::Count(3).resolve(10), 3);
        assert_eq!(BatchLimit::Count(30).resolve(10), 10);
        assert_eq!(BatchLimit::Fraction(0.25).resolve(10), 2);
        assert_eq!(BatchLimit::Fraction(0.01).resolve(10), 1);
        assert_eq!(BatchLimit::Fraction(0.5).resolve(0), 0);
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainerConfig { max_epochs: 0, ..trainer_config(dir.path()) };
        assert!(Trainer::<TestBackend>::new(cfg, Default::default()).is_err());
    }

    #[test]
    fn test_fit_test_predict_on_mock_data() {
        let dir        = tempfile::tempdir().unwrap();
        let mut dm     = datamodule(dir.path());
        let mut trainer = Trainer::<TestBackend>::new(trainer_config(dir.path()), Default::default()).unwrap();

        let model_cfg = ClassifierConfig::new().with_hidden_dim(32).with_learning_rate(1e-3);
        let model     = model_cfg.init::<TestBackend>(trainer.device());

        let (_model, fit) = trainer.fit(model, &model_cfg, &mut dm).unwrap();
        assert_eq!(fit.epochs.len(), 2);
        assert!(fit.epochs.iter().all(|e| e.train_loss.is_some() && e.valid_loss.is_some()));
        assert!(fit.best_epoch == 1 || fit.best_epoch == 2);
        assert!(dir.path().join("runs/checkpoints/best.json").exists());

        let valid = trainer.validate(&CheckpointRef::Best, &mut dm).unwrap();
        assert!(valid.unwrap() >= 0.0);

        // 24 test images, batch 8, drop_last → 3 batches
        let test = trainer.test(&CheckpointRef::Best, &mut dm).unwrap();
        assert_eq!(test.batches, 3);
        assert!(test.loss.unwrap() >= 0.0);
        let acc = test.accuracy.unwrap();
        assert!((0.0..=1.0).contains(&acc));

        let predictions = trainer.predict(&CheckpointRef::Last, &mut dm).unwrap();
        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].dims(), [8, 10]);

        let csv = std::fs::read_to_string(dir.path().join("runs/metrics.csv")).unwrap();
        assert!(csv.contains("fit,1,0,train_loss_step,"));
        assert!(csv.contains("fit,1,,train_loss_epoch,"));
        assert!(csv.contains("fit,2,,valid_loss_epoch,"));
        assert!(csv.contains("test,0,,test_acc,"));
    }

    #[test]
    fn test_limits_and_manual_sgd_with_trace() {
        let dir    = tempfile::tempdir().unwrap();
        let mut dm = datamodule(dir.path());
        let cfg    = TrainerConfig {
            max_epochs:          1,
            limit_train_batches: BatchLimit::Count(3),
            limit_val_batches:   BatchLimit::Count(1),
            profiler:            Some(ProfilerKind::Trace),
            optimization:        OptimizationMode::Manual,
            optimizer:           OptimizerKind::Sgd,
            ..trainer_config(dir.path())
        };
        let mut trainer = Trainer::<TestBackend>::new(cfg, Default::default()).unwrap();

        let model_cfg = ClassifierConfig::new().with_learning_rate(1e-3);
        let model     = model_cfg.init::<TestBackend>(trainer.device());
        let (_model, fit) = trainer.fit(model, &model_cfg, &mut dm).unwrap();
        assert_eq!(fit.best_epoch, 1);

        let trace = std::fs::read_to_string(dir.path().join("runs/profiler/fit.pt.trace.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&trace).unwrap();
        let names: Vec<&str> = json["traceEvents"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["name"].as_str())
            .collect();
        assert_eq!(names.iter().filter(|n| **n == "training_step").count(), 3);
        assert_eq!(names.iter().filter(|n| **n == "validation_step").count(), 1);
        // manual optimization steps inside training_step
        assert!(!names.contains(&"optimizer_step"));
    }

    #[test]
    fn test_without_checkpoint_test_fails() {
        let dir         = tempfile::tempdir().unwrap();
        let mut dm      = datamodule(dir.path());
        let mut trainer = Trainer::<TestBackend>::new(trainer_config(dir.path()), Default::default()).unwrap();
        assert!(trainer.test(&CheckpointRef::Best, &mut dm).is_err());
    }
}
