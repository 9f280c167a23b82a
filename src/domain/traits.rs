// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The trainer only depends on these seams:
//
//   DataModule  → something that can materialise its data and
//                 partition it for a given stage
//   MetricSink  → somewhere step functions can report scalars
//
// MnistDataModule implements the first, MetricLogger the second.
// Tests plug in small in-memory sinks instead of the CSV logger.

use anyhow::Result;

use crate::domain::stage::Stage;

// ─── Preparation ──────────────────────────────────────────────────────────────
/// What `prepare_data` had to do to make the raw files available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Every file was already on disk; nothing was touched
    AlreadyPresent,
    /// Missing files were fetched from a remote mirror
    Downloaded,
    /// Missing files were synthesised (mock source)
    Generated,
}

// ─── DataModule ───────────────────────────────────────────────────────────────
/// Owns every step needed to turn raw files into partitions.
pub trait DataModule {
    /// Make sure the raw data exists on disk.
    /// Calling it again once the data is present must be a no-op.
    fn prepare_data(&self) -> Result<Preparation>;

    /// Load and partition the data needed by `stage`
    /// (`None` loads everything).
    fn setup(&mut self, stage: Option<Stage>) -> Result<()>;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// When a logged scalar should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Report the raw value of every step
    pub on_step: bool,
    /// Report the mean over the epoch
    pub on_epoch: bool,
}

impl LogOptions {
    pub const EPOCH: Self = Self { on_step: false, on_epoch: true };
    pub const BOTH: Self  = Self { on_step: true,  on_epoch: true };
}

/// Receives named scalars from step functions.
/// Logging is observational only; a sink never changes control flow.
pub trait MetricSink {
    fn log(&mut self, name: &str, value: f64, options: LogOptions);
}

/// Discards everything
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[cfg(test)]
impl MetricSink for NullSink {
    fn log(&mut self, _name: &str, _value: f64, _options: LogOptions) {}
}
