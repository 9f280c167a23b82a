// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw MNIST files to tensor batches.
//
//   DatasetSource     → downloads (or synthesises) the IDX files
//       │
//       ▼
//   MnistDataset      → parses them, implements Burn's Dataset
//       │
//       ▼
//   split_indices     → seeded train / validation partition
//       │
//       ▼
//   MnistBatcher      → stacks items into [N, 1, 28, 28] tensors
//       │
//       ▼
//   MnistDataModule   → owns all of the above, hands out loaders

/// Typed errors for the whole pipeline
pub mod error;

/// IDX file parsing and the in-memory dataset
pub mod mnist;

/// Remote download or mock generation of the raw files
pub mod source;

/// Seeded train/validation partition
pub mod splitter;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// The data module handed to the trainer
pub mod datamodule;
