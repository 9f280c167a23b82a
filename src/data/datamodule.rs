// ============================================================
// Layer 4 — MNIST Data Module
// ============================================================
// Bundles every data step a run needs behind one object:
//
//   prepare_data()        → make sure the raw files are on disk
//   setup(stage)          → load + split what `stage` needs
//   train_dataloader()    → shuffled, drops the ragged last batch
//   val_dataloader()      → held-out part of the training set
//   test_dataloader()     → the official 10k test split
//   predict_dataloader()  → the test split, every example kept
//
// Loaders are generic over the Burn backend, so the trainer
// can ask for autodiff batches when training and plain
// batches when evaluating.
//
// Workers: `num_workers == 0` loads on the calling thread.
// With N > 0 workers Burn hands each worker its own slice of
// the (shuffled) dataset, so with drop_last every worker's
// short tail batch is skipped and `num_batches()` is an
// upper bound on what one pass yields.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{MnistBatch, MnistBatcher},
    error::DataError,
    mnist::MnistDataset,
    source::DatasetSource,
    splitter::{split_indices, SubsetDataset},
};
use crate::domain::{
    mnist_item::{MnistSplit, IMAGE_COLS, IMAGE_ROWS, NUM_CLASSES},
    stage::Stage,
    traits::{DataModule, Preparation},
};

type Subset = SubsetDataset<MnistDataset>;

// ─── Configuration ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModuleConfig {
    /// Where downloaded or generated files are kept
    pub data_dir:    PathBuf,
    /// How many training images are held out for validation
    pub val_split:   usize,
    /// Worker threads used by each data loader (0 = load on the caller's thread)
    pub num_workers: usize,
    /// Map pixels to [-1, 1] instead of [0, 1]
    pub normalize:   bool,
    /// Seed for the train/validation split and train shuffling
    pub seed:        u64,
    pub batch_size:  usize,
    /// Skip the final batch when it is smaller than `batch_size`
    pub drop_last:   bool,
    pub source:      DatasetSource,
}

impl Default for DataModuleConfig {
    fn default() -> Self {
        Self {
            data_dir:    PathBuf::from("data"),
            val_split:   5000,
            num_workers: 16,
            normalize:   false,
            seed:        42,
            batch_size:  32,
            drop_last:   true,
            source:      DatasetSource::remote(),
        }
    }
}

// ─── MnistLoader ──────────────────────────────────────────────────────────────
/// A Burn data loader plus the drop-last rule Burn does not provide.
pub struct MnistLoader<B: Backend> {
    inner:      Arc<dyn DataLoader<MnistBatch<B>>>,
    batch_size: usize,
    drop_last:  bool,
}

impl<B: Backend> MnistLoader<B> {
    pub fn iter(&self) -> impl Iterator<Item = MnistBatch<B>> + '_ {
        self.inner
            .iter()
            .filter(move |batch| !self.drop_last || batch.batch_size() == self.batch_size)
    }

    /// Batches one pass over the loader yields
    pub fn num_batches(&self) -> usize {
        let items = self.inner.num_items();
        if self.drop_last {
            items / self.batch_size
        } else {
            items.div_ceil(self.batch_size)
        }
    }
}

// ─── MnistDataModule ──────────────────────────────────────────────────────────
pub struct MnistDataModule {
    config: DataModuleConfig,
    train:  Option<Subset>,
    valid:  Option<Subset>,
    test:   Option<Arc<MnistDataset>>,
}

impl MnistDataModule {
    pub const NAME: &'static str = "mnist";

    pub fn new(config: DataModuleConfig) -> Result<Self, DataError> {
        if config.batch_size == 0 {
            return Err(DataError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if let DatasetSource::Mock { train_len, .. } = config.source {
            if config.val_split >= train_len {
                return Err(DataError::InvalidSplit { val_split: config.val_split, total: train_len });
            }
        }
        Ok(Self { config, train: None, valid: None, test: None })
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Shape of a single example: (channels, rows, cols)
    pub fn dims(&self) -> (usize, usize, usize) {
        (1, IMAGE_ROWS, IMAGE_COLS)
    }

    pub fn num_classes(&self) -> usize {
        NUM_CLASSES
    }

    /// Index partition of the training set, once set up
    pub fn split_indices(&self) -> Option<(&[usize], &[usize])> {
        Some((self.train.as_ref()?.indices(), self.valid.as_ref()?.indices()))
    }

    pub fn train_dataloader<B: Backend>(&self, device: &B::Device) -> Result<MnistLoader<B>, DataError> {
        let dataset = self.train.clone().ok_or(DataError::NotSetUp("train"))?;
        Ok(self.build_loader(dataset, device, true, self.config.drop_last))
    }

    pub fn val_dataloader<B: Backend>(&self, device: &B::Device) -> Result<MnistLoader<B>, DataError> {
        let dataset = self.valid.clone().ok_or(DataError::NotSetUp("validation"))?;
        Ok(self.build_loader(dataset, device, false, self.config.drop_last))
    }

    pub fn test_dataloader<B: Backend>(&self, device: &B::Device) -> Result<MnistLoader<B>, DataError> {
        let dataset = self.full_test()?;
        Ok(self.build_loader(dataset, device, false, self.config.drop_last))
    }

    pub fn predict_dataloader<B: Backend>(&self, device: &B::Device) -> Result<MnistLoader<B>, DataError> {
        let dataset = self.full_test()?;
        Ok(self.build_loader(dataset, device, false, false))
    }

    fn full_test(&self) -> Result<Subset, DataError> {
        let test = self.test.clone().ok_or(DataError::NotSetUp("test"))?;
        let indices = (0..test.len()).collect();
        Ok(SubsetDataset::new(test, indices))
    }

    fn build_loader<B: Backend>(
        &self,
        dataset:   Subset,
        device:    &B::Device,
        shuffle:   bool,
        drop_last: bool,
    ) -> MnistLoader<B> {
        let batcher = MnistBatcher::<B>::new(device.clone(), self.config.normalize);
        let mut builder = DataLoaderBuilder::new(batcher).batch_size(self.config.batch_size);
        // Burn splits the dataset by worker count; zero means no worker threads
        if self.config.num_workers > 0 {
            builder = builder.num_workers(self.config.num_workers);
        }
        if shuffle {
            builder = builder.shuffle(self.config.seed);
        }

        MnistLoader {
            inner:      builder.build(dataset),
            batch_size: self.config.batch_size,
            drop_last,
        }
    }

    fn root(&self) -> PathBuf {
        self.config.source.root(&self.config.data_dir)
    }
}

impl DataModule for MnistDataModule {
    fn prepare_data(&self) -> Result<Preparation> {
        let prep = self.config.source.materialize(&self.config.data_dir)?;
        tracing::info!("MNIST data in '{}': {:?}", self.root().display(), prep);
        Ok(prep)
    }

    fn setup(&mut self, stage: Option<Stage>) -> Result<()> {
        let root = self.root();

        if matches!(stage, None | Some(Stage::Fit) | Some(Stage::Validate)) {
            let full  = Arc::new(MnistDataset::load(&root, MnistSplit::Train)?);
            let split = split_indices(full.len(), self.config.val_split, self.config.seed)?;
            tracing::info!(
                "Split {} training images: {} train, {} validation",
                full.len(), split.train.len(), split.valid.len()
            );
            self.train = Some(SubsetDataset::new(Arc::clone(&full), split.train));
            self.valid = Some(SubsetDataset::new(full, split.valid));
        }

        if matches!(stage, None | Some(Stage::Test) | Some(Stage::Predict)) {
            let test = MnistDataset::load(&root, MnistSplit::Test)?;
            tracing::info!("Loaded {} test images", test.len());
            self.test = Some(Arc::new(test));
        }

        Ok(())
    }
}
