// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// The sink step functions log their scalars into.
//
//   on_step  → the raw value is written every
//              `log_every_n_steps` steps
//   on_epoch → values are averaged and written once the
//              epoch ends
//
// A metric logged with both gets step/epoch suffixes:
// `valid_loss_step` and `valid_loss_epoch`.
//
// Why one long-format CSV instead of one column per metric?
//   - Stages log different metrics (test has test_acc, fit
//     does not), and long rows never need a schema change
//   - Step rows and epoch rows share one file and are told
//     apart by the empty `step` column
//   - Repeated runs append, so a fit followed by a test on
//     the same root ends up in one file
//
// Output file: <root>/metrics.csv
//
//   stage,epoch,step,name,value
//   fit,1,49,valid_loss_step,2.291034
//   fit,1,,train_loss_epoch,2.301877
//   fit,1,,valid_loss_epoch,2.287701
//
// How to read the metrics:
//   - train_loss_epoch should fall from epoch to epoch
//   - valid_loss_epoch rising while train_loss_epoch falls
//     → overfitting; best.json keeps the earlier epoch
//   - *_step rows are noisy; use them for learning curves
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::domain::stage::Stage;
use crate::domain::traits::{LogOptions, MetricSink};

/// One row of the CSV
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub stage: Stage,
    pub epoch: usize,
    /// `None` for epoch aggregates
    pub step:  Option<usize>,
    pub name:  String,
    pub value: f64,
}

/// Mean losses for one epoch of `fit`
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: Option<f64>,
    pub valid_loss: Option<f64>,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: Option<f64>, valid_loss: Option<f64>) -> Self {
        Self { epoch, train_loss, valid_loss }
    }

    /// Lower validation loss than `best` wins. Without validation
    /// every epoch counts as an improvement, so the last one is kept.
    pub fn is_improvement(&self, best: Option<f64>) -> bool {
        match (self.valid_loss, best) {
            (Some(loss), Some(best)) => loss < best,
            _ => true,
        }
    }
}

pub struct MetricLogger {
    csv_path:          PathBuf,
    log_every_n_steps: usize,
    stage:             Stage,
    epoch:             usize,
    step:              usize,
    epoch_values:      BTreeMap<String, (Vec<f64>, bool)>,
    pending:           Vec<MetricRow>,
}

impl MetricLogger {
    /// Writes the CSV header if the file doesn't exist yet,
    /// so repeated runs append to the same log.
    pub fn new(dir: impl Into<PathBuf>, log_every_n_steps: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "stage,epoch,step,name,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self {
            csv_path,
            log_every_n_steps: log_every_n_steps.max(1),
            stage:             Stage::Fit,
            epoch:             0,
            step:              0,
            epoch_values:      BTreeMap::new(),
            pending:           Vec::new(),
        })
    }

    /// Start collecting values for `epoch` of `stage`
    pub fn begin_epoch(&mut self, stage: Stage, epoch: usize) {
        self.stage = stage;
        self.epoch = epoch;
        self.epoch_values.clear();
    }

    /// Global step used for on-step rows
    pub fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    /// Average the epoch values, append every pending row to the
    /// CSV and return the means keyed by metric name.
    pub fn end_epoch(&mut self) -> Result<BTreeMap<String, f64>> {
        let mut means = BTreeMap::new();

        for (name, (values, both)) in std::mem::take(&mut self.epoch_values) {
            if values.is_empty() {
                continue;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let row_name = if both { format!("{name}_epoch") } else { name.clone() };
            self.pending.push(MetricRow {
                stage: self.stage,
                epoch: self.epoch,
                step:  None,
                name:  row_name,
                value: mean,
            });
            means.insert(name, mean);
        }

        self.flush()?;
        Ok(means)
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        for row in self.pending.drain(..) {
            let step = row.step.map(|s| s.to_string()).unwrap_or_default();
            writeln!(f, "{},{},{},{},{:.6}", row.stage, row.epoch, step, row.name, row.value)?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

impl MetricSink for MetricLogger {
    fn log(&mut self, name: &str, value: f64, options: LogOptions) {
        let both = options.on_step && options.on_epoch;

        if options.on_step && self.step % self.log_every_n_steps == 0 {
            let row_name = if both { format!("{name}_step") } else { name.to_string() };
            tracing::debug!("step {} {}={:.4}", self.step, row_name, value);
            self.pending.push(MetricRow {
                stage: self.stage,
                epoch: self.epoch,
                step:  Some(self.step),
                name:  row_name,
                value,
            });
        }

        if options.on_epoch {
            let entry = self
                .epoch_values
                .entry(name.to_string())
                .or_insert_with(|| (Vec::new(), both));
            entry.0.push(value);
        }
    }
}
