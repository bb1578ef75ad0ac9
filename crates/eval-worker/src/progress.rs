//! Completion estimate for a running analysis.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// 0.0 ..= 100.0
    pub percent: f64,
}

/// Remote pass: share of states already evaluated.
pub fn remote_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed.min(total) as f64 / total as f64 * 100.0
}

/// Local pass: settled states count for a full `target_depth`, in-flight ones for
/// the depth reached so far (capped below `target_depth` until they report).
pub fn local_percent<I>(settled: usize, in_flight_depths: I, total: usize, target_depth: u32) -> f64
where
    I: IntoIterator<Item = u32>,
{
    if total == 0 || target_depth == 0 {
        return 100.0;
    }
    let target = u64::from(target_depth);
    let in_flight: u64 = in_flight_depths
        .into_iter()
        .map(|d| u64::from(d).min(target - 1))
        .sum();
    let done = settled.min(total) as u64 * target + in_flight;
    let max = total as u64 * target;
    done.min(max) as f64 / max as f64 * 100.0
}

/// Emits progress once per scheduler step, never going backwards.
#[derive(Debug)]
pub struct ProgressMonitor {
    total: usize,
    target_depth: u32,
    last: f64,
    sink: Option<UnboundedSender<Progress>>,
}

impl ProgressMonitor {
    pub fn new(total: usize, target_depth: u32) -> Self {
        Self {
            total,
            target_depth,
            last: 0.0,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Option<UnboundedSender<Progress>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn report_remote(&mut self, completed: usize) -> Progress {
        let percent = remote_percent(completed, self.total);
        self.emit(ProgressPhase::Remote, percent)
    }

    pub fn report_local<I>(&mut self, settled: usize, in_flight_depths: I) -> Progress
    where
        I: IntoIterator<Item = u32>,
    {
        let percent = local_percent(settled, in_flight_depths, self.total, self.target_depth);
        self.emit(ProgressPhase::Local, percent)
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    fn emit(&mut self, phase: ProgressPhase, percent: f64) -> Progress {
        self.last = percent.clamp(self.last, 100.0);
        let progress = Progress {
            phase,
            percent: self.last,
        };

        info!(phase = ?phase, percent = progress.percent, "Evaluating positions...");
        if let Some(sink) = &self.sink {
            let _ = sink.send(progress);
        }
        progress
    }
}
