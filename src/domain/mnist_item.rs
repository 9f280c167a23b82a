// ============================================================
// Layer 3 — MNIST Domain Type
// ============================================================
// A single 28×28 grayscale digit with its class label.
// Pixels are kept as raw bytes; conversion to floats happens
// in the batcher so the dataset stays compact in memory.

use serde::{Deserialize, Serialize};

/// Image height in pixels
pub const IMAGE_ROWS: usize = 28;

/// Image width in pixels
pub const IMAGE_COLS: usize = 28;

/// Number of pixels in one image (784)
pub const IMAGE_PIXELS: usize = IMAGE_ROWS * IMAGE_COLS;

/// Digits 0 through 9
pub const NUM_CLASSES: usize = 10;

/// One labelled MNIST example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnistItem {
    /// Row-major pixel intensities, `IMAGE_PIXELS` bytes
    pub image: Vec<u8>,

    /// Class label in `0..NUM_CLASSES`
    pub label: u8,
}

impl MnistItem {
    pub fn new(image: Vec<u8>, label: u8) -> Self {
        Self { image, label }
    }
}

/// Which half of MNIST a file set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MnistSplit {
    /// 60,000 training images
    Train,
    /// 10,000 held-out test images
    Test,
}
