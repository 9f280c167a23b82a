// ============================================================
// Layer 2 — RunUseCase
// ============================================================
// Builds the data module, the model and the trainer from one
// RunConfig and drives a stage:
//
//   fit      → train, checkpoint every epoch
//   validate → validation loss of saved weights
//   test     → test loss / accuracy of saved weights
//   predict  → class scores for the test split
//   run      → fit, then test and predict with the best
//              checkpoint, then print the first prediction
//
// Every stage first writes the resolved configuration to
// <default_root_dir>/config.json.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::datamodule::{DataModuleConfig, MnistDataModule};
use crate::infra::checkpoint::CheckpointRef;
use crate::ml::{
    model::ClassifierConfig,
    trainer::{FitOutcome, TestOutcome, Trainer, TrainerConfig},
};

// ─── Run Configuration ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub trainer: TrainerConfig,
    pub data:    DataModuleConfig,
    pub model:   ClassifierConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerConfig::default(),
            data:    DataModuleConfig::default(),
            model:   ClassifierConfig::new(),
        }
    }
}

impl RunConfig {
    pub fn config_path(&self) -> PathBuf {
        self.trainer.default_root_dir.join("config.json")
    }

    /// Overwrite `<default_root_dir>/config.json`
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(path)
    }
}

// ─── Predictions summary ─────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PredictSummary {
    pub batches:     usize,
    /// Class scores of the first batch, one row per image
    pub first_batch: Vec<Vec<f32>>,
}

impl PredictSummary {
    fn from_scores<B: Backend>(scores: &[Tensor<B, 2>]) -> Result<Self> {
        let first_batch = match scores.first() {
            Some(t) => {
                let [_, classes] = t.dims();
                let flat = t
                    .to_data()
                    .to_vec::<f32>()
                    .map_err(|e| anyhow::anyhow!("Cannot read prediction scores: {e:?}"))?;
                flat.chunks(classes.max(1)).map(|row| row.to_vec()).collect()
            }
            None => Vec::new(),
        };
        Ok(Self { batches: scores.len(), first_batch })
    }

    /// Predicted class per image of the first batch
    pub fn first_batch_classes(&self) -> Vec<usize> {
        self.first_batch
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                    .0
            })
            .collect()
    }
}

// ─── RunUseCase ──────────────────────────────────────────────────────────────
pub struct RunUseCase {
    config: RunConfig,
}

impl RunUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    fn prepare<B: AutodiffBackend>(&self, device: B::Device) -> Result<(Trainer<B>, MnistDataModule)> {
        self.config.save()?;
        let trainer    = Trainer::<B>::new(self.config.trainer.clone(), device)?;
        let datamodule = MnistDataModule::new(self.config.data.clone())?;
        tracing::info!(
            "Data module '{}': dims {:?}, {} classes",
            datamodule.name(),
            datamodule.dims(),
            datamodule.num_classes(),
        );
        Ok((trainer, datamodule))
    }

    pub fn fit<B: AutodiffBackend>(&self, device: B::Device) -> Result<FitOutcome> {
        let (mut trainer, mut dm) = self.prepare::<B>(device)?;
        let model = self.config.model.init::<B>(trainer.device());
        let (_, outcome) = trainer.fit(model, &self.config.model, &mut dm)?;
        Ok(outcome)
    }

    pub fn validate<B: AutodiffBackend>(&self, device: B::Device, ckpt: &CheckpointRef) -> Result<Option<f64>> {
        let (mut trainer, mut dm) = self.prepare::<B>(device)?;
        trainer.validate(ckpt, &mut dm)
    }

    pub fn test<B: AutodiffBackend>(&self, device: B::Device, ckpt: &CheckpointRef) -> Result<TestOutcome> {
        let (mut trainer, mut dm) = self.prepare::<B>(device)?;
        trainer.test(ckpt, &mut dm)
    }

    pub fn predict<B: AutodiffBackend>(&self, device: B::Device, ckpt: &CheckpointRef) -> Result<PredictSummary> {
        let (mut trainer, mut dm) = self.prepare::<B>(device)?;
        let scores = trainer.predict(ckpt, &mut dm)?;
        PredictSummary::from_scores(&scores)
    }

    /// fit → test(best) → predict(best), printing the first
    /// prediction batch at the end.
    pub fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<(FitOutcome, TestOutcome, PredictSummary)> {
        let (mut trainer, mut dm) = self.prepare::<B>(device)?;

        let model        = self.config.model.init::<B>(trainer.device());
        let (_, fitted)  = trainer.fit(model, &self.config.model, &mut dm)?;
        let tested       = trainer.test(&CheckpointRef::Best, &mut dm)?;
        let scores       = trainer.predict(&CheckpointRef::Best, &mut dm)?;

        if let Some(first) = scores.first() {
            println!("First prediction batch:\n{first}");
        }
        let summary = PredictSummary::from_scores(&scores)?;
        println!("Predicted classes: {:?}", summary.first_batch_classes());

        Ok((fitted, tested, summary))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::DatasetSource;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn mock_config(dir: &std::path::Path) -> RunConfig {
        RunConfig {
            trainer: TrainerConfig {
                max_epochs:       1,
                default_root_dir: dir.join("runs"),
                ..Default::default()
            },
            data: DataModuleConfig {
                data_dir:    dir.join("data"),
                val_split:   8,
                batch_size:  4,
                num_workers: 1,
                source:      DatasetSource::mock(32, 12),
                ..Default::default()
            },
            model: ClassifierConfig::new().with_hidden_dim(16),
        }
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = mock_config(dir.path());
        let path = cfg.save().unwrap();

        let back: RunConfig = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.data.source, DatasetSource::mock(32, 12));
        assert_eq!(back.model.hidden_dim, 16);
        assert_eq!(back.trainer.max_epochs, 1);
    }

    #[test]
    fn test_run_end_to_end_on_mock_data() {
        let dir      = tempfile::tempdir().unwrap();
        let use_case = RunUseCase::new(mock_config(dir.path()));

        let (fitted, tested, predicted) = use_case.run::<TestBackend>(Default::default()).unwrap();
        assert_eq!(fitted.best_epoch, 1);
        assert_eq!(tested.batches, 3);
        assert_eq!(predicted.batches, 3);
        assert_eq!(predicted.first_batch.len(), 4);
        assert!(predicted.first_batch.iter().all(|row| row.len() == 10));
        assert!(predicted.first_batch_classes().iter().all(|&c| c < 10));
        assert!(dir.path().join("runs/config.json").exists());
    }

    #[test]
    fn test_stage_without_fit_reports_missing_checkpoint() {
        let dir      = tempfile::tempdir().unwrap();
        let use_case = RunUseCase::new(mock_config(dir.path()));
        let err      = use_case.test::<TestBackend>(Default::default(), &CheckpointRef::Best).unwrap_err();
        assert!(format!("{err:#}").contains("fit"));
    }
}
