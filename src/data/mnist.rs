// ============================================================
// Layer 4 — MNIST IDX Files
// ============================================================
// Reads the four MNIST files into memory and exposes them
// through Burn's Dataset trait.
//
// IDX format (all header values big-endian u32):
//   images: magic(2051) | count | rows | cols | pixels (u8...)
//   labels: magic(2049) | count | labels (u8...)
//
// Files live decompressed under <root>/raw/.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::data::dataset::Dataset;

use crate::data::error::DataError;
use crate::domain::mnist_item::{MnistItem, MnistSplit, IMAGE_COLS, IMAGE_ROWS};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// (images, labels) file names for a split
pub fn file_names(split: MnistSplit) -> (&'static str, &'static str) {
    match split {
        MnistSplit::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
        MnistSplit::Test  => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
    }
}

/// All four raw file names, train first
pub fn all_file_names() -> [&'static str; 4] {
    let (train_images, train_labels) = file_names(MnistSplit::Train);
    let (test_images, test_labels)   = file_names(MnistSplit::Test);
    [train_images, train_labels, test_images, test_labels]
}

/// Directory holding the raw files for a dataset root
pub fn raw_dir(root: &Path) -> PathBuf {
    root.join("raw")
}

// ─── MnistDataset ─────────────────────────────────────────────────────────────
/// One split of MNIST, fully in memory.
#[derive(Debug, Clone)]
pub struct MnistDataset {
    images: Vec<Vec<u8>>,
    labels: Vec<u8>,
}

impl MnistDataset {
    /// Load `split` from `<root>/raw/`.
    pub fn load(root: &Path, split: MnistSplit) -> Result<Self, DataError> {
        let raw = raw_dir(root);
        let (img_name, lbl_name) = file_names(split);
        let img_path = raw.join(img_name);
        let lbl_path = raw.join(lbl_name);

        let img_bytes = read_existing(&img_path)?;
        let lbl_bytes = read_existing(&lbl_path)?;

        let images = parse_images(&img_path, &img_bytes)?;
        let labels = parse_labels(&lbl_path, &lbl_bytes)?;

        if images.len() != labels.len() {
            return Err(DataError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }

        tracing::debug!("Loaded {} {:?} examples from '{}'", images.len(), split, raw.display());
        Ok(Self { images, labels })
    }
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        let image = self.images.get(index)?.clone();
        let label = *self.labels.get(index)?;
        Some(MnistItem::new(image, label))
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

fn read_existing(path: &Path) -> Result<Vec<u8>, DataError> {
    if !path.exists() {
        return Err(DataError::NotPrepared { path: path.to_path_buf() });
    }
    fs::read(path).map_err(|e| DataError::io(path, e))
}

// ─── IDX parsing ──────────────────────────────────────────────────────────────

fn parse_images(path: &Path, data: &[u8]) -> Result<Vec<Vec<u8>>, DataError> {
    check_len(path, data, 16)?;
    check_magic(path, data, IMAGES_MAGIC)?;

    let count = read_u32_be(data, 4) as usize;
    let rows  = read_u32_be(data, 8) as usize;
    let cols  = read_u32_be(data, 12) as usize;

    // The model flattens to 784 inputs; anything else is not MNIST
    if rows != IMAGE_ROWS || cols != IMAGE_COLS {
        return Err(DataError::InvalidShape {
            path:          path.to_path_buf(),
            rows,
            cols,
            expected_rows: IMAGE_ROWS,
            expected_cols: IMAGE_COLS,
        });
    }

    let pixels = rows * cols;
    check_len(path, data, 16 + count * pixels)?;

    Ok(data[16..16 + count * pixels]
        .chunks_exact(pixels)
        .map(|chunk| chunk.to_vec())
        .collect())
}

fn parse_labels(path: &Path, data: &[u8]) -> Result<Vec<u8>, DataError> {
    check_len(path, data, 8)?;
    check_magic(path, data, LABELS_MAGIC)?;

    let count = read_u32_be(data, 4) as usize;
    check_len(path, data, 8 + count)?;

    Ok(data[8..8 + count].to_vec())
}

fn check_len(path: &Path, data: &[u8], expected: usize) -> Result<(), DataError> {
    if data.len() < expected {
        return Err(DataError::Truncated {
            path: path.to_path_buf(),
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

fn check_magic(path: &Path, data: &[u8], expected: u32) -> Result<(), DataError> {
    let got = read_u32_be(data, 0);
    if got != expected {
        return Err(DataError::InvalidMagic { path: path.to_path_buf(), expected, got });
    }
    Ok(())
}

fn read_u32_be(data: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

// ─── IDX writing ──────────────────────────────────────────────────────────────
// Used by the mock source to synthesise files in the same format.

pub fn encode_images(images: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + images.len() * IMAGE_ROWS * IMAGE_COLS);
    buf.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(images.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(IMAGE_ROWS as u32).to_be_bytes());
    buf.extend_from_slice(&(IMAGE_COLS as u32).to_be_bytes());
    for img in images {
        buf.extend_from_slice(img);
    }
    buf
}

pub fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + labels.len());
    buf.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    buf.extend_from_slice(labels);
    buf
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mnist_item::IMAGE_PIXELS;

    fn write_split(root: &Path, split: MnistSplit, images: &[Vec<u8>], labels: &[u8]) {
        let raw = raw_dir(root);
        fs::create_dir_all(&raw).unwrap();
        let (img_name, lbl_name) = file_names(split);
        fs::write(raw.join(img_name), encode_images(images)).unwrap();
        fs::write(raw.join(lbl_name), encode_labels(labels)).unwrap();
    }

    #[test]
    fn test_load_reads_items_in_order() {
        let dir    = tempfile::tempdir().unwrap();
        let images = vec![vec![0u8; IMAGE_PIXELS], vec![255u8; IMAGE_PIXELS]];
        write_split(dir.path(), MnistSplit::Train, &images, &[3, 7]);

        let ds = MnistDataset::load(dir.path(), MnistSplit::Train).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().label, 3);
        assert_eq!(ds.get(1).unwrap().image, vec![255u8; IMAGE_PIXELS]);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_missing_files_are_not_prepared() {
        let dir = tempfile::tempdir().unwrap();
        let err = MnistDataset::load(dir.path(), MnistSplit::Test).unwrap_err();
        assert!(matches!(err, DataError::NotPrepared { .. }));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = encode_labels(&[0, 1]);
        bytes[3] = 99;
        let err = parse_labels(Path::new("labels"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::InvalidMagic { expected: 2049, .. }));
    }

    #[test]
    fn test_truncated_images() {
        let mut bytes = encode_images(&[vec![1u8; IMAGE_PIXELS]]);
        bytes.truncate(100);
        let err = parse_images(Path::new("images"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::Truncated { found: 100, .. }));
    }

    #[test]
    fn test_non_mnist_image_size() {
        // header for 2 images of 32x32, payload included
        let mut bytes = Vec::new();
        for v in [IMAGES_MAGIC, 2, 32, 32] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend(std::iter::repeat(0u8).take(2 * 32 * 32));

        let err = parse_images(Path::new("images"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::InvalidShape { rows: 32, cols: 32, .. }));
    }

    #[test]
    fn test_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), MnistSplit::Test, &[vec![0u8; IMAGE_PIXELS]], &[1, 2]);
        let err = MnistDataset::load(dir.path(), MnistSplit::Test).unwrap_err();
        assert!(matches!(err, DataError::CountMismatch { images: 1, labels: 2 }));
    }
}
