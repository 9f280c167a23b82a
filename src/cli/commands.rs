// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Subcommands:
//   tensors                      — tensor creation demo
//   run                          — fit → test(best) → predict(best)
//   fit / validate / test / predict — one stage each
//   profile                      — a short profiled fit
//
// Trainer, data and model flags are shared through flattened
// argument groups and converted into the application-layer
// RunConfig; the application layer never sees clap types.
//
// Examples:
//   mnist-trainer fit --max-epochs 3 --dataset-source mock
//   mnist-trainer test --ckpt-path best
//   mnist-trainer profile --manual-optimization
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::run_use_case::RunConfig;
use crate::data::{datamodule::DataModuleConfig, source::DatasetSource};
use crate::infra::{checkpoint::CheckpointRef, profiler::ProfilerKind};
use crate::ml::{
    model::ClassifierConfig,
    step::{OptimizationMode, OptimizerKind},
    trainer::{BatchLimit, TrainerConfig},
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a few tensors and print their attributes
    Tensors(TensorsArgs),

    /// Fit, then test and predict with the best checkpoint
    Run(RunArgs),

    /// Train the classifier
    Fit(RunArgs),

    /// Validation loss of a saved checkpoint
    Validate(StageArgs),

    /// Test loss and accuracy of a saved checkpoint
    Test(StageArgs),

    /// Class scores for the test split
    Predict(StageArgs),

    /// Short profiled fit (1 epoch, 3 train / 3 val batches, trace output)
    Profile(ProfileArgs),
}

impl Commands {
    pub fn accelerator(&self) -> Accelerator {
        match self {
            Commands::Tensors(a)  => a.accelerator,
            Commands::Run(a) | Commands::Fit(a) => a.trainer.accelerator,
            Commands::Validate(a) | Commands::Test(a) | Commands::Predict(a) => a.run.trainer.accelerator,
            Commands::Profile(a)  => a.accelerator,
        }
    }
}

// ─── Value enums ──────────────────────────────────────────────────────────────
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accelerator {
    Cpu,
    Gpu,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfilerArg {
    Simple,
    Trace,
}

impl From<ProfilerArg> for ProfilerKind {
    fn from(p: ProfilerArg) -> Self {
        match p {
            ProfilerArg::Simple => ProfilerKind::Simple,
            ProfilerArg::Trace  => ProfilerKind::Trace,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceArg {
    /// Download the real dataset
    Remote,
    /// Generate synthetic digits locally
    Mock,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerArg {
    Adam,
    Sgd,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(o: OptimizerArg) -> Self {
        match o {
            OptimizerArg::Adam => OptimizerKind::Adam,
            OptimizerArg::Sgd  => OptimizerKind::Sgd,
        }
    }
}

// ─── Argument groups ──────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TensorsArgs {
    #[arg(long, value_enum, default_value_t = Accelerator::Cpu)]
    pub accelerator: Accelerator,
}

#[derive(Args, Debug, Clone)]
pub struct TrainerArgs {
    /// Number of passes over the training split
    #[arg(long, default_value_t = 10)]
    pub max_epochs: usize,

    /// Batches per epoch: a count, a fraction in (0, 1] or "all"
    #[arg(long, default_value = "all")]
    pub limit_train_batches: BatchLimit,

    #[arg(long, default_value = "all")]
    pub limit_val_batches: BatchLimit,

    #[arg(long, default_value = "all")]
    pub limit_test_batches: BatchLimit,

    #[arg(long, default_value = "all")]
    pub limit_predict_batches: BatchLimit,

    /// Optimizer steps only every N batches
    #[arg(long, default_value_t = 1)]
    pub accumulate_grad_batches: usize,

    /// Write on-step metric rows every N steps
    #[arg(long, default_value_t = 50)]
    pub log_every_n_steps: usize,

    #[arg(long, value_enum, default_value_t = Accelerator::Cpu)]
    pub accelerator: Accelerator,

    #[arg(long, value_enum)]
    pub profiler: Option<ProfilerArg>,

    /// Run backward and the optimizer step inside training_step
    #[arg(long)]
    pub manual_optimization: bool,

    /// Checkpoints, metrics.csv, config.json and profiler output
    #[arg(long, default_value = "runs")]
    pub default_root_dir: PathBuf,

    /// Seed for parameter initialisation
    #[arg(long, default_value_t = 1234)]
    pub seed: u64,
}

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Where the dataset is downloaded or generated
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Training images held out for validation
    #[arg(long, default_value_t = 5000)]
    pub val_split: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 16)]
    pub num_workers: usize,

    /// Map pixels to [-1, 1]
    #[arg(long)]
    pub normalize: bool,

    /// Seed for the train/validation split and shuffling
    #[arg(long, default_value_t = 42)]
    pub split_seed: u64,

    #[arg(long, value_enum, default_value_t = SourceArg::Remote)]
    pub dataset_source: SourceArg,

    /// Synthetic training images (mock source only)
    #[arg(long, default_value_t = 6000)]
    pub mock_train_len: usize,

    /// Synthetic test images (mock source only)
    #[arg(long, default_value_t = 1000)]
    pub mock_test_len: usize,
}

impl From<DataArgs> for DataModuleConfig {
    fn from(a: DataArgs) -> Self {
        let source = match a.dataset_source {
            SourceArg::Remote => DatasetSource::remote(),
            SourceArg::Mock   => DatasetSource::mock(a.mock_train_len, a.mock_test_len),
        };
        DataModuleConfig {
            data_dir:    a.data_dir,
            val_split:   a.val_split,
            num_workers: a.num_workers,
            normalize:   a.normalize,
            seed:        a.split_seed,
            batch_size:  a.batch_size,
            drop_last:   true,
            source,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Width of the hidden layer
    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    #[arg(long, value_enum, default_value_t = OptimizerArg::Adam)]
    pub optimizer: OptimizerArg,
}

impl From<ModelArgs> for ClassifierConfig {
    fn from(a: ModelArgs) -> Self {
        ClassifierConfig::new()
            .with_hidden_dim(a.hidden_dim)
            .with_learning_rate(a.learning_rate)
    }
}

/// Trainer + data + model flags
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub trainer: TrainerArgs,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub model: ModelArgs,
}

impl From<RunArgs> for RunConfig {
    fn from(a: RunArgs) -> Self {
        let t = a.trainer;
        let trainer = TrainerConfig {
            max_epochs:              t.max_epochs,
            limit_train_batches:     t.limit_train_batches,
            limit_val_batches:       t.limit_val_batches,
            limit_test_batches:      t.limit_test_batches,
            limit_predict_batches:   t.limit_predict_batches,
            accumulate_grad_batches: t.accumulate_grad_batches,
            log_every_n_steps:       t.log_every_n_steps,
            default_root_dir:        t.default_root_dir,
            profiler:                t.profiler.map(Into::into),
            optimization:            if t.manual_optimization {
                OptimizationMode::Manual
            } else {
                OptimizationMode::Automatic
            },
            optimizer:               a.model.optimizer.into(),
            seed:                    t.seed,
        };
        RunConfig {
            trainer,
            data:  a.data.into(),
            model: a.model.into(),
        }
    }
}

/// Run flags plus which checkpoint to evaluate
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// "best", "last" or a checkpoint path without extension
    #[arg(long, default_value = "best")]
    pub ckpt_path: CheckpointRef,
}

/// Same flags as `fit`, with defaults suited to a quick
/// profiling session.
#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(long, default_value_t = 1)]
    pub max_epochs: usize,

    #[arg(long, default_value = "3")]
    pub limit_train_batches: BatchLimit,

    #[arg(long, default_value = "3")]
    pub limit_val_batches: BatchLimit,

    #[arg(long, value_enum, default_value_t = ProfilerArg::Trace)]
    pub profiler: ProfilerArg,

    /// Run backward and the optimizer step inside training_step
    #[arg(long)]
    pub manual_optimization: bool,

    #[arg(long, value_enum, default_value_t = Accelerator::Cpu)]
    pub accelerator: Accelerator,

    #[arg(long, default_value = "runs/profile")]
    pub default_root_dir: PathBuf,

    #[arg(long, default_value_t = 1234)]
    pub seed: u64,

    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    #[arg(long, value_enum, default_value_t = OptimizerArg::Sgd)]
    pub optimizer: OptimizerArg,

    #[command(flatten)]
    pub data: DataArgs,
}

impl From<ProfileArgs> for RunConfig {
    fn from(a: ProfileArgs) -> Self {
        let trainer = TrainerConfig {
            max_epochs:          a.max_epochs,
            limit_train_batches: a.limit_train_batches,
            limit_val_batches:   a.limit_val_batches,
            default_root_dir:    a.default_root_dir,
            profiler:            Some(a.profiler.into()),
            optimization:        if a.manual_optimization {
                OptimizationMode::Manual
            } else {
                OptimizationMode::Automatic
            },
            optimizer:           a.optimizer.into(),
            seed:                a.seed,
            ..TrainerConfig::default()
        };
        RunConfig {
            trainer,
            data:  a.data.into(),
            model: ClassifierConfig::new()
                .with_hidden_dim(a.hidden_dim)
                .with_learning_rate(a.learning_rate),
        }
    }
}
