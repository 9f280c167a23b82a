// ============================================================
// Layer 4 — Dataset Source
// ============================================================
// Decides where the raw MNIST files come from and makes sure
// they are on disk ("ensure materialised").
//
//   Remote → download the four .gz files, trying each mirror
//            in order, gunzip, write atomically.
//   Mock   → synthesise deterministic IDX files locally, for
//            machines without network access.
//
// The choice is an explicit configuration value. A failed
// download is an error; it never switches to the mock data.
//
// Both sources keep their files in separate roots so mock
// data can never be mistaken for the real dataset:
//   <data_dir>/MNIST/raw/...
//   <data_dir>/MNIST-mock-<train_len>-<test_len>/raw/...
//
// The mock sizes are part of the root, so changing them
// generates a fresh set instead of reusing old files.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use flate2::read::GzDecoder;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::error::DataError;
use crate::data::mnist::{all_file_names, encode_images, encode_labels, file_names, raw_dir};
use crate::domain::mnist_item::{MnistSplit, IMAGE_COLS, IMAGE_PIXELS, IMAGE_ROWS, NUM_CLASSES};
use crate::domain::traits::Preparation;

/// Public mirrors of the original gzip files, tried in order
pub const DEFAULT_MIRRORS: [&str; 2] = [
    "https://ossci-datasets.s3.amazonaws.com/mnist/",
    "https://storage.googleapis.com/cvdf-datasets/mnist/",
];

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const MOCK_SEED: u64 = 0x4d4e_4953;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetSource {
    /// Download from the first mirror that answers
    Remote { mirrors: Vec<String> },
    /// Generate `train_len` / `test_len` synthetic digits
    Mock { train_len: usize, test_len: usize },
}

impl Default for DatasetSource {
    fn default() -> Self {
        Self::remote()
    }
}

impl DatasetSource {
    pub fn remote() -> Self {
        DatasetSource::Remote {
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn mock(train_len: usize, test_len: usize) -> Self {
        DatasetSource::Mock { train_len, test_len }
    }

    /// Dataset root under `data_dir` for this source
    pub fn root(&self, data_dir: &Path) -> PathBuf {
        match self {
            DatasetSource::Remote { .. } => data_dir.join("MNIST"),
            DatasetSource::Mock { train_len, test_len } => {
                data_dir.join(format!("MNIST-mock-{train_len}-{test_len}"))
            }
        }
    }

    /// Make sure all four raw files exist under `root(data_dir)`.
    /// Touches neither the network nor the disk when they already do.
    pub fn materialize(&self, data_dir: &Path) -> Result<Preparation, DataError> {
        let raw = raw_dir(&self.root(data_dir));
        let missing: Vec<&str> = all_file_names()
            .into_iter()
            .filter(|name| !raw.join(name).exists())
            .collect();

        if missing.is_empty() {
            tracing::debug!("All MNIST files present in '{}'", raw.display());
            return Ok(Preparation::AlreadyPresent);
        }

        fs::create_dir_all(&raw).map_err(|e| DataError::io(&raw, e))?;

        match self {
            DatasetSource::Remote { mirrors } => {
                for name in missing {
                    download_one(mirrors, name, &raw)?;
                }
                Ok(Preparation::Downloaded)
            }
            DatasetSource::Mock { train_len, test_len } => {
                tracing::info!(
                    "Generating mock MNIST ({} train / {} test) in '{}'",
                    train_len, test_len, raw.display()
                );
                write_mock_split(&raw, MnistSplit::Train, *train_len, MOCK_SEED)?;
                write_mock_split(&raw, MnistSplit::Test, *test_len, MOCK_SEED + 1)?;
                Ok(Preparation::Generated)
            }
        }
    }
}

// ─── Remote ───────────────────────────────────────────────────────────────────

fn download_one(mirrors: &[String], name: &str, raw: &Path) -> Result<(), DataError> {
    let mut last_error = String::from("no mirrors configured");

    for mirror in mirrors {
        let url = format!("{mirror}{name}.gz");
        tracing::info!("Downloading {}", url);

        match fetch_gz(&url) {
            Ok(bytes) => return write_atomic(&raw.join(name), &bytes),
            Err(e) => {
                tracing::warn!("Failed to download {}: {}", url, e);
                last_error = e;
            }
        }
    }

    Err(DataError::Download {
        file:     name.to_string(),
        attempts: mirrors.len(),
        last_error,
    })
}

fn fetch_gz(url: &str) -> Result<Vec<u8>, String> {
    let response = ureq::get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .call()
        .map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    GzDecoder::new(response.into_reader())
        .read_to_end(&mut out)
        .map_err(|e| format!("gunzip failed: {e}"))?;
    Ok(out)
}

/// Write to `<path>.part` first so an interrupted run never
/// leaves a half-written file that looks materialised.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    fs::write(&part, bytes).map_err(|e| DataError::io(&part, e))?;
    fs::rename(&part, path).map_err(|e| DataError::io(path, e))?;
    tracing::debug!("Wrote {} bytes to '{}'", bytes.len(), path.display());
    Ok(())
}

// ─── Mock ─────────────────────────────────────────────────────────────────────
// Each synthetic digit is low-intensity noise plus a bright
// vertical bar whose column depends on the label, so a model
// trained on it still has something to learn.

fn mock_image(rng: &mut StdRng, label: u8) -> Vec<u8> {
    let mut img: Vec<u8> = (0..IMAGE_PIXELS).map(|_| rng.gen_range(0..64)).collect();
    let col = 4 + 2 * label as usize;
    for row in 4..IMAGE_ROWS - 4 {
        for c in col..(col + 2).min(IMAGE_COLS) {
            img[row * IMAGE_COLS + c] = rng.gen_range(192..=255);
        }
    }
    img
}

fn write_mock_split(raw: &Path, split: MnistSplit, len: usize, seed: u64) -> Result<(), DataError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<u8> = (0..len).map(|_| rng.gen_range(0..NUM_CLASSES as u8)).collect();
    let images: Vec<Vec<u8>> = labels.iter().map(|&l| mock_image(&mut rng, l)).collect();

    let (img_name, lbl_name) = file_names(split);
    write_atomic(&raw.join(img_name), &encode_images(&images))?;
    write_atomic(&raw.join(lbl_name), &encode_labels(&labels))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mnist::MnistDataset;
    use burn::data::dataset::Dataset;

    // Nothing listens on the discard port, so connections fail fast
    fn unreachable() -> DatasetSource {
        DatasetSource::Remote { mirrors: vec!["http://127.0.0.1:9/".to_string()] }
    }

    #[test]
    fn test_mock_materialize_is_idempotent() {
        let dir    = tempfile::tempdir().unwrap();
        let source = DatasetSource::mock(50, 20);

        assert_eq!(source.materialize(dir.path()).unwrap(), Preparation::Generated);
        let raw     = raw_dir(&source.root(dir.path()));
        let written = fs::metadata(raw.join("train-images-idx3-ubyte")).unwrap().modified().unwrap();

        assert_eq!(source.materialize(dir.path()).unwrap(), Preparation::AlreadyPresent);
        let again = fs::metadata(raw.join("train-images-idx3-ubyte")).unwrap().modified().unwrap();
        assert_eq!(written, again);
    }

    #[test]
    fn test_mock_data_is_deterministic_and_loadable() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let source = DatasetSource::mock(30, 10);
        source.materialize(a.path()).unwrap();
        source.materialize(b.path()).unwrap();

        let ds_a = MnistDataset::load(&source.root(a.path()), MnistSplit::Train).unwrap();
        let ds_b = MnistDataset::load(&source.root(b.path()), MnistSplit::Train).unwrap();
        assert_eq!(ds_a.len(), 30);
        for i in 0..ds_a.len() {
            let item = ds_a.get(i).unwrap();
            assert!(item.label < 10);
            assert_eq!(Some(item), ds_b.get(i));
        }
    }

    #[test]
    fn test_changed_mock_size_regenerates() {
        let dir   = tempfile::tempdir().unwrap();
        let small = DatasetSource::mock(50, 10);
        let large = DatasetSource::mock(120, 30);

        assert_eq!(small.materialize(dir.path()).unwrap(), Preparation::Generated);
        assert_eq!(large.materialize(dir.path()).unwrap(), Preparation::Generated);

        let train = MnistDataset::load(&large.root(dir.path()), MnistSplit::Train).unwrap();
        let test  = MnistDataset::load(&large.root(dir.path()), MnistSplit::Test).unwrap();
        assert_eq!(train.len(), 120);
        assert_eq!(test.len(), 30);

        // the first set is still there and still reused
        assert_eq!(small.materialize(dir.path()).unwrap(), Preparation::AlreadyPresent);
    }

    #[test]
    fn test_remote_skips_network_when_files_exist() {
        let dir    = tempfile::tempdir().unwrap();
        let source = unreachable();
        let raw    = raw_dir(&source.root(dir.path()));
        fs::create_dir_all(&raw).unwrap();
        for name in all_file_names() {
            fs::write(raw.join(name), b"cached").unwrap();
        }

        assert_eq!(source.materialize(dir.path()).unwrap(), Preparation::AlreadyPresent);
        assert_eq!(source.materialize(dir.path()).unwrap(), Preparation::AlreadyPresent);
    }

    #[test]
    fn test_remote_failure_is_an_error_not_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let err = unreachable().materialize(dir.path()).unwrap_err();

        assert!(matches!(err, DataError::Download { attempts: 1, .. }));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("MNIST-mock"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_no_mirrors_is_an_error() {
        let dir    = tempfile::tempdir().unwrap();
        let source = DatasetSource::Remote { mirrors: Vec::new() };
        let err    = source.materialize(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::Download { attempts: 0, .. }));
    }
}
