// ============================================================
// Layer 6 — Profiler
// ============================================================
// Times named actions (training_step, backward, optimizer_step,
// validation_step, ...) while a stage runs.
//
//   Simple → at the end of a stage, log count / mean / total
//            per action
//   Trace  → also write every call as a Chrome trace event to
//            <root>/profiler/<stage>.pt.trace.json
//
// Trace files open in chrome://tracing or Perfetto.

use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfilerKind {
    Simple,
    Trace,
}

/// One complete ("X") event in the Chrome trace format
#[derive(Debug, Clone, Serialize)]
struct TraceEvent {
    name: String,
    ph:   &'static str,
    /// microseconds since the profiler started
    ts:   u128,
    dur:  u128,
    pid:  u32,
    tid:  u32,
}

/// Aggregated timings of one action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSummary {
    pub action: String,
    pub calls:  usize,
    pub total:  Duration,
    pub mean:   Duration,
}

pub struct Profiler {
    kind:       Option<ProfilerKind>,
    output_dir: PathBuf,
    origin:     Instant,
    records:    BTreeMap<String, Vec<Duration>>,
    events:     Vec<TraceEvent>,
}

impl Profiler {
    /// A profiler that only runs the closures
    pub fn disabled() -> Self {
        Self::build(None, PathBuf::new())
    }

    pub fn new(kind: ProfilerKind, root_dir: impl Into<PathBuf>) -> Self {
        Self::build(Some(kind), root_dir.into().join("profiler"))
    }

    fn build(kind: Option<ProfilerKind>, output_dir: PathBuf) -> Self {
        Self {
            kind,
            output_dir,
            origin:  Instant::now(),
            records: BTreeMap::new(),
            events:  Vec::new(),
        }
    }

    /// Run `f`, recording its wall-clock time under `action`.
    pub fn profile<T>(&mut self, action: &str, f: impl FnOnce() -> T) -> T {
        if self.kind.is_none() {
            return f();
        }

        let start = Instant::now();
        let out   = f();
        let dur   = start.elapsed();

        self.records.entry(action.to_string()).or_default().push(dur);
        if self.kind == Some(ProfilerKind::Trace) {
            self.events.push(TraceEvent {
                name: action.to_string(),
                ph:   "X",
                ts:   start.duration_since(self.origin).as_micros(),
                dur:  dur.as_micros(),
                pid:  std::process::id(),
                tid:  0,
            });
        }
        out
    }

    /// Per-action totals, slowest first
    pub fn summary(&self) -> Vec<ActionSummary> {
        let mut rows: Vec<ActionSummary> = self
            .records
            .iter()
            .map(|(action, durations)| {
                let total: Duration = durations.iter().sum();
                ActionSummary {
                    action: action.clone(),
                    calls:  durations.len(),
                    total,
                    mean:   total / durations.len().max(1) as u32,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total));
        rows
    }

    /// Report what was recorded during `stage` and reset.
    /// Returns the trace file path when one was written.
    pub fn finish_stage(&mut self, stage: Stage) -> Result<Option<PathBuf>> {
        if self.kind.is_none() {
            return Ok(None);
        }

        tracing::info!("Profiler report for stage '{}':", stage);
        for row in self.summary() {
            tracing::info!(
                "  {:<20} calls={:>6}  mean={:>10.3?}  total={:>10.3?}",
                row.action, row.calls, row.mean, row.total
            );
        }

        let written = match self.kind {
            Some(ProfilerKind::Trace) => Some(self.write_trace(stage)?),
            _ => None,
        };

        self.records.clear();
        self.events.clear();
        Ok(written)
    }

    fn write_trace(&self, stage: Stage) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Cannot create '{}'", self.output_dir.display()))?;

        let path  = self.output_dir.join(format!("{stage}.pt.trace.json"));
        let trace = serde_json::json!({
            "traceEvents":     self.events,
            "displayTimeUnit": "ms",
        });
        fs::write(&path, serde_json::to_string(&trace)?)
            .with_context(|| format!("Cannot write trace to '{}'", path.display()))?;

        tracing::info!("Wrote {} trace events to '{}'", self.events.len(), path.display());
        Ok(path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_profiler_still_runs_closure() {
        let mut p = Profiler::disabled();
        assert_eq!(p.profile("x", || 41 + 1), 42);
        assert!(p.summary().is_empty());
        assert_eq!(p.finish_stage(Stage::Fit).unwrap(), None);
    }

    #[test]
    fn test_simple_summary_counts_calls() {
        let dir   = tempfile::tempdir().unwrap();
        let mut p = Profiler::new(ProfilerKind::Simple, dir.path());
        for _ in 0..3 {
            p.profile("training_step", || ());
        }
        p.profile("validation_step", || ());

        let summary = p.summary();
        let train   = summary.iter().find(|r| r.action == "training_step").unwrap();
        assert_eq!(train.calls, 3);
        assert_eq!(summary.len(), 2);

        // simple profiling never writes a trace
        assert_eq!(p.finish_stage(Stage::Fit).unwrap(), None);
        assert!(p.summary().is_empty());
    }

    #[test]
    fn test_trace_file_lists_events() {
        let dir   = tempfile::tempdir().unwrap();
        let mut p = Profiler::new(ProfilerKind::Trace, dir.path());
        p.profile("training_step", || ());
        p.profile("validation_step", || ());

        let path = p.finish_stage(Stage::Fit).unwrap().unwrap();
        assert!(path.ends_with("profiler/fit.pt.trace.json"));

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        let events = json["traceEvents"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "training_step");
        assert_eq!(events[0]["ph"], "X");
    }
}
