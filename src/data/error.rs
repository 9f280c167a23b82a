// ============================================================
// Layer 4 — Data Errors
// ============================================================
// Every way the data pipeline can fail, as one typed enum.
// The application layer wraps these in anyhow with context;
// tests match on the variants directly.

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// The held-out split would leave no training examples
    #[error("validation split of {val_split} examples must be smaller than the {total} available")]
    InvalidSplit { val_split: usize, total: usize },

    /// A configuration value is out of range
    #[error("invalid data module configuration: {0}")]
    InvalidConfig(String),

    /// Every mirror failed for one file
    #[error("failed to download '{file}' from {attempts} mirror(s); last error: {last_error}")]
    Download {
        file:       String,
        attempts:   usize,
        last_error: String,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' has magic {got:#06x}, expected {expected:#06x}", .path.display())]
    InvalidMagic { path: PathBuf, expected: u32, got: u32 },

    #[error("'{}' is truncated: expected {expected} bytes, found {found}", .path.display())]
    Truncated { path: PathBuf, expected: usize, found: usize },

    /// Image files holding anything other than 28x28 pixels
    #[error("'{}' holds {rows}x{cols} images, expected {expected_rows}x{expected_cols}", .path.display())]
    InvalidShape {
        path:          PathBuf,
        rows:          usize,
        cols:          usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("{images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    /// `setup` ran before `prepare_data` materialised the files
    #[error("dataset file '{}' not found; run prepare_data first", .path.display())]
    NotPrepared { path: PathBuf },

    /// A loader was requested before `setup` loaded its split
    #[error("the {0} split has not been set up")]
    NotSetUp(&'static str),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DataError::Io { path: path.into(), source }
    }
}
