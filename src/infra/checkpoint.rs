// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores classifier weights using Burn's
// CompactRecorder (half-precision MessagePack).
//
// File layout:
//   <root>/checkpoints/
//     epoch_1.mpk          ← weights after epoch 1
//     epoch_2.mpk          ← weights after epoch 2
//     ...
//     last.json            ← {"epoch": n, "valid_loss": ...}
//     best.json            ← same shape, lowest valid_loss
//     model_config.json    ← ClassifierConfig used to build the model
//
// The config is needed to rebuild the exact architecture
// before the weights can be loaded back into it.
//
// Why pointer files instead of copying weights?
//   - best/last are a few bytes of JSON, rewritten each epoch
//   - every epoch stays on disk, so `--ckpt-path` can name
//     any of them
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{anyhow, Context, Result};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::ml::model::{Classifier, ClassifierConfig};

/// Which weights a stage should run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointRef {
    /// Lowest validation loss seen by `fit`
    Best,
    /// Most recently saved epoch
    Last,
    /// Explicit recorder path (without extension)
    Path(PathBuf),
}

impl FromStr for CheckpointRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "best" => CheckpointRef::Best,
            "last" => CheckpointRef::Last,
            path   => CheckpointRef::Path(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for CheckpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointRef::Best    => f.write_str("best"),
            CheckpointRef::Last    => f.write_str("last"),
            CheckpointRef::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Contents of last.json / best.json
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPointer {
    pub epoch:      usize,
    pub valid_loss: Option<f64>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager and its directory (like `mkdir -p`)
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Record path (without extension) for an epoch
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch}"))
    }

    /// Save weights for `epoch` and point last.json at them
    pub fn save_model<B: Backend>(
        &self,
        model:      &Classifier<B>,
        epoch:      usize,
        valid_loss: Option<f64>,
    ) -> Result<PathBuf> {
        let path = self.epoch_path(epoch);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        self.write_pointer("last.json", CheckpointPointer { epoch, valid_loss })?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(path)
    }

    /// Point best.json at an already saved epoch
    pub fn mark_best(&self, pointer: CheckpointPointer) -> Result<()> {
        self.write_pointer("best.json", pointer)?;
        tracing::info!("New best checkpoint: epoch {} (valid_loss={:?})", pointer.epoch, pointer.valid_loss);
        Ok(())
    }

    /// Turn a `CheckpointRef` into a record path
    pub fn resolve(&self, ckpt: &CheckpointRef) -> Result<PathBuf> {
        match ckpt {
            CheckpointRef::Best    => Ok(self.epoch_path(self.read_pointer("best.json")?.epoch)),
            CheckpointRef::Last    => Ok(self.epoch_path(self.read_pointer("last.json")?.epoch)),
            CheckpointRef::Path(p) => Ok(p.clone()),
        }
    }

    /// Restore weights from `path` into `model`.
    /// Fails if the architecture does not match the record.
    pub fn load_model<B: Backend>(
        &self,
        model:  Classifier<B>,
        path:   &Path,
        device: &B::Device,
    ) -> Result<Classifier<B>> {
        tracing::info!("Loading checkpoint '{}'", path.display());

        let record = CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you run 'fit' first?", path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &ClassifierConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<ClassifierConfig> {
        let path = self.dir.join("model_config.json");
        ClassifierConfig::load(&path).map_err(|e| {
            anyhow!("Cannot read model config from '{}': {e}. Run 'fit' first.", path.display())
        })
    }

    fn write_pointer(&self, name: &str, pointer: CheckpointPointer) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string(&pointer)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }

    fn read_pointer(&self, name: &str) -> Result<CheckpointPointer> {
        let path = self.dir.join(name);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'fit' first?", path.display()))?;
        Ok(serde_json::from_str(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_parse_checkpoint_ref() {
        assert_eq!("best".parse::<CheckpointRef>().unwrap(), CheckpointRef::Best);
        assert_eq!("last".parse::<CheckpointRef>().unwrap(), CheckpointRef::Last);
        assert_eq!(
            "runs/epoch_3".parse::<CheckpointRef>().unwrap(),
            CheckpointRef::Path(PathBuf::from("runs/epoch_3"))
        );
    }

    #[test]
    fn test_resolve_without_fit_fails() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.resolve(&CheckpointRef::Best).is_err());
        assert!(ckpt.load_config().is_err());
    }

    #[test]
    fn test_save_and_restore_weights() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let cfg    = ClassifierConfig::new().with_hidden_dim(16);

        let model = cfg.init::<TestBackend>(&device);
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_model(&model, 1, Some(0.5)).unwrap();
        ckpt.mark_best(CheckpointPointer { epoch: 1, valid_loss: Some(0.5) }).unwrap();

        let restored_cfg = ckpt.load_config().unwrap();
        assert_eq!(restored_cfg.hidden_dim, 16);

        let path     = ckpt.resolve(&CheckpointRef::Best).unwrap();
        assert_eq!(path, ckpt.epoch_path(1));
        let restored = ckpt.load_model(restored_cfg.init::<TestBackend>(&device), &path, &device).unwrap();

        let input  = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);
        let before = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let after  = restored.forward(input).into_data().to_vec::<f32>().unwrap();
        // CompactRecorder stores half precision
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-2);
        }
    }
}
