// ============================================================
// Layer 4 — MNIST Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<MnistItem>
// into one image tensor and one label tensor.
//
// How batching works here:
//   Input:  N items, each with 784 u8 pixels and a u8 label
//   Output: images  [N, 1, 28, 28]  (f32 in [0, 1])
//           targets [N]             (Int)
//
// With `normalize` the pixels are additionally mapped to
// [-1, 1] via (x - 0.5) / 0.5.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::mnist_item::{MnistItem, IMAGE_COLS, IMAGE_ROWS};

const NORM_MEAN: f32 = 0.5;
const NORM_STD:  f32 = 0.5;

// ─── MnistBatch ───────────────────────────────────────────────────────────────
/// Input tensor and labels for one step.
#[derive(Debug, Clone)]
pub struct MnistBatch<B: Backend> {
    /// Shape: [batch_size, 1, 28, 28]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatch<B> {
    /// Number of examples in this batch
    pub fn batch_size(&self) -> usize {
        self.targets.dims()[0]
    }
}

// ─── MnistBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device:    B::Device,
    normalize: bool,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device, normalize: bool) -> Self {
        Self { device, normalize }
    }

    fn scale(&self, pixel: u8) -> f32 {
        let x = pixel as f32 / 255.0;
        if self.normalize {
            (x - NORM_MEAN) / NORM_STD
        } else {
            x
        }
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let batch_size = items.len();

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().map(|&p| self.scale(p)))
            .collect();

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, 1, IMAGE_ROWS, IMAGE_COLS]);

        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        MnistBatch { images, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mnist_item::IMAGE_PIXELS;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn items() -> Vec<MnistItem> {
        vec![
            MnistItem::new(vec![0u8; IMAGE_PIXELS], 4),
            MnistItem::new(vec![255u8; IMAGE_PIXELS], 9),
            MnistItem::new(vec![51u8; IMAGE_PIXELS], 0),
        ]
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), false);
        let batch   = batcher.batch(items());

        assert_eq!(batch.images.dims(), [3, 1, 28, 28]);
        assert_eq!(batch.targets.dims(), [3]);
        assert_eq!(batch.batch_size(), 3);

        let labels = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![4, 9, 0]);
    }

    #[test]
    fn test_pixels_scaled_to_unit_range() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), false);
        let values  = batcher.batch(items()).images.into_data().to_vec::<f32>().unwrap();

        assert_eq!(values[0], 0.0);
        assert_eq!(values[IMAGE_PIXELS], 1.0);
        assert!((values[2 * IMAGE_PIXELS] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_maps_to_symmetric_range() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), true);
        let values  = batcher.batch(items()).images.into_data().to_vec::<f32>().unwrap();

        assert_eq!(values[0], -1.0);
        assert_eq!(values[IMAGE_PIXELS], 1.0);
    }
}
