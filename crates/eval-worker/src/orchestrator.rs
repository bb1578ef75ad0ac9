//! Evaluation scheduler: remote pass, then local pass, then done.
//!
//! The remote pass walks states in order and stops at the first position the
//! lookup cannot answer with two lines. Everything still unevaluated (always
//! including the starting position) is then handed to the local pool, which is
//! driven on a fixed tick until every state is settled.

use std::sync::Arc;
use std::time::Duration;

use chess_core::{replay, BoardState, EvaluationSource, EvaluationValue};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::cloud_eval::RemoteLookup;
use crate::engine::LocalEngine;
use crate::error::WorkerError;
use crate::pool::{PoolConfig, WorkerPool};
use crate::progress::{Progress, ProgressMonitor};

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub target_depth: u32,
    pub max_concurrency: usize,
    pub engine_retries: u32,
    pub tick_interval: Duration,
    /// Budget for the whole run; outstanding work is torn down when it runs out.
    pub timeout: Option<Duration>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            target_depth: 16,
            max_concurrency: 8,
            engine_retries: 1,
            tick_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every state was evaluated or marked unresolved by the retry policy.
    Complete,
    /// The budget ran out; unevaluated states were marked unresolved.
    TimedOut,
}

/// The fully evaluated sequence handed to report generation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub states: Vec<BoardState>,
    pub outcome: RunOutcome,
}

impl EvaluationRun {
    pub fn unresolved_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_unresolved()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RemotePass { next: usize },
    LocalPass,
    Done(RunOutcome),
}

pub struct Orchestrator<'a, R, E> {
    lookup: &'a R,
    pool: WorkerPool<E>,
    progress: ProgressMonitor,
    tick_interval: Duration,
    deadline: Option<Instant>,
}

impl<'a, R: RemoteLookup, E: LocalEngine> Orchestrator<'a, R, E> {
    pub fn new(lookup: &'a R, engine: Arc<E>, options: &AnalysisOptions, total: usize) -> Self {
        let pool = WorkerPool::new(
            engine,
            PoolConfig {
                max_concurrency: options.max_concurrency.max(1),
                target_depth: options.target_depth,
                engine_retries: options.engine_retries,
            },
        );

        Self {
            lookup,
            pool,
            progress: ProgressMonitor::new(total, options.target_depth),
            tick_interval: options.tick_interval,
            deadline: options.timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn with_progress_sink(mut self, sink: Option<UnboundedSender<Progress>>) -> Self {
        self.progress = self.progress.with_sink(sink);
        self
    }

    /// Drive `states` to completion. Returns once every state is settled.
    pub async fn run(mut self, states: &mut [BoardState]) -> RunOutcome {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // index 0 precedes any move and is never looked up remotely
        let mut phase = Phase::RemotePass { next: 1 };
        info!(positions = states.len(), "Evaluating positions");

        loop {
            phase = match phase {
                Phase::RemotePass { next } => self.remote_step(states, next).await,
                Phase::LocalPass => self.local_tick(states, &mut ticker).await,
                Phase::Done(outcome) => return outcome,
            };
        }
    }

    async fn remote_step(&mut self, states: &mut [BoardState], next: usize) -> Phase {
        if next >= states.len() {
            info!("Remote pass complete");
            return Phase::LocalPass;
        }

        let fen = states[next].fen.clone();
        let client = self.lookup;
        let lookup = client.lookup(&fen);
        let outcome = match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, lookup).await {
                Ok(outcome) => outcome,
                Err(_) => return self.time_out(states),
            },
            None => lookup.await,
        };

        match outcome.authoritative_lines() {
            Some(lines) => {
                states[next].record_lines(lines, EvaluationSource::Remote);
                let completed = states.iter().filter(|s| s.has_lines()).count();
                self.progress.report_remote(completed);
                Phase::RemotePass { next: next + 1 }
            }
            None => {
                let previous = &mut states[next - 1];
                let fallback = previous
                    .best_line()
                    .map(|line| line.value)
                    .unwrap_or(EvaluationValue::ZERO);
                previous.fallback_evaluation = Some(fallback);

                let completed = states.iter().filter(|s| s.has_lines()).count();
                self.progress.report_remote(completed);
                info!(index = next, "Remote lookup missed, switching to local evaluation");
                Phase::LocalPass
            }
        }
    }

    async fn local_tick(&mut self, states: &mut [BoardState], ticker: &mut Interval) -> Phase {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = deadline_reached(self.deadline) => return self.time_out(states),
        }

        self.pool.collect(states);
        self.pool.try_assign(states);

        let settled = states.iter().filter(|s| s.is_settled()).count();
        self.progress.report_local(settled, self.pool.in_flight_depths());

        if settled == states.len() {
            info!(
                unresolved = states.iter().filter(|s| s.is_unresolved()).count(),
                "All positions settled"
            );
            Phase::Done(RunOutcome::Complete)
        } else {
            Phase::LocalPass
        }
    }

    fn time_out(&mut self, states: &mut [BoardState]) -> Phase {
        let aborted = self.pool.shutdown();
        let mut unresolved = 0;
        for state in states.iter_mut().filter(|s| !s.is_settled()) {
            state.mark_unresolved();
            unresolved += 1;
        }
        warn!(aborted, unresolved, "Analysis budget exhausted");
        // every state is now settled, so this reports 100
        self.progress.report_local(states.len(), std::iter::empty());
        Phase::Done(RunOutcome::TimedOut)
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Replay `moves` from `starting_fen` and fill in an evaluation for every ply.
///
/// An illegal move fails the whole request before any lookup or search starts.
pub async fn acquire_evaluations<R, E>(
    lookup: &R,
    engine: Arc<E>,
    starting_fen: &str,
    moves: &[String],
    options: &AnalysisOptions,
    progress: Option<UnboundedSender<Progress>>,
) -> Result<EvaluationRun, WorkerError>
where
    R: RemoteLookup,
    E: LocalEngine,
{
    let mut states = replay(starting_fen, moves)?;
    info!(
        positions = states.len(),
        target_depth = options.target_depth,
        "Replayed game"
    );

    let outcome = Orchestrator::new(lookup, engine, options, states.len())
        .with_progress_sink(progress)
        .run(&mut states)
        .await;

    Ok(EvaluationRun { states, outcome })
}
