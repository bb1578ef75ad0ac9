//! Bounded pool of local engine evaluations.
//!
//! The pool never blocks: `try_assign` starts as many searches as there are free
//! slots, and `collect` applies whatever has finished since the last call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chess_core::{BoardState, EvaluationLine, EvaluationSource};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{DepthReporter, LocalEngine};
use crate::error::WorkerError;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_concurrency: usize,
    pub target_depth: u32,
    /// Extra attempts after the first failure before a state is given up
    pub engine_retries: u32,
}

/// A state currently being searched. Dropping it frees the slot.
struct WorkItem {
    attempt: u32,
    depth: watch::Receiver<u32>,
    handle: JoinHandle<()>,
    _permit: OwnedSemaphorePermit,
}

struct Completion {
    index: usize,
    result: Result<Vec<EvaluationLine>, WorkerError>,
}

pub struct WorkerPool<E> {
    engine: Arc<E>,
    config: PoolConfig,
    slots: Arc<Semaphore>,
    active: BTreeMap<usize, WorkItem>,
    failures: HashMap<usize, u32>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<E: LocalEngine> WorkerPool<E> {
    pub fn new(engine: Arc<E>, config: PoolConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            active: BTreeMap::new(),
            failures: HashMap::new(),
            completions_tx,
            completions_rx,
        }
    }

    /// Start searches for unsettled, unclaimed states, lowest index first.
    /// Returns how many were started.
    pub fn try_assign(&mut self, states: &[BoardState]) -> usize {
        let mut started = 0;

        for (index, state) in states.iter().enumerate() {
            if state.is_settled() || self.active.contains_key(&index) {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };
            self.spawn(index, state.fen.clone(), permit);
            started += 1;
        }

        started
    }

    fn spawn(&mut self, index: usize, fen: String, permit: OwnedSemaphorePermit) {
        let (reporter, depth) = DepthReporter::channel();
        let engine = Arc::clone(&self.engine);
        let tx = self.completions_tx.clone();
        let target_depth = self.config.target_depth;
        let attempt = self.failures.get(&index).copied().unwrap_or(0) + 1;

        debug!(index, attempt, "Starting local evaluation");
        let handle = tokio::spawn(async move {
            let result = engine.evaluate(&fen, target_depth, &reporter).await;
            let _ = tx.send(Completion { index, result });
        });

        self.active.insert(
            index,
            WorkItem {
                attempt,
                depth,
                handle,
                _permit: permit,
            },
        );
    }

    /// Apply finished searches to `states`. Returns how many states became settled.
    pub fn collect(&mut self, states: &mut [BoardState]) -> usize {
        // A task that finished before the drain has already sent its completion;
        // one still active afterwards ended without reporting.
        let finished: Vec<usize> = self
            .active
            .iter()
            .filter(|(_, item)| item.handle.is_finished())
            .map(|(index, _)| *index)
            .collect();

        let mut settled = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            settled += self.finish(completion.index, completion.result, states);
        }

        for index in finished {
            if self.active.contains_key(&index) {
                let lost = Err(WorkerError::Engine("evaluation task ended without a result".into()));
                settled += self.finish(index, lost, states);
            }
        }

        settled
    }

    fn finish(
        &mut self,
        index: usize,
        result: Result<Vec<EvaluationLine>, WorkerError>,
        states: &mut [BoardState],
    ) -> usize {
        let Some(item) = self.active.remove(&index) else {
            return 0;
        };
        let Some(state) = states.get_mut(index) else {
            return 0;
        };

        match result {
            Ok(lines) => {
                debug!(index, lines = lines.len(), "Local evaluation complete");
                self.failures.remove(&index);
                state.record_lines(lines, EvaluationSource::Local);
                1
            }
            Err(e) => {
                let failures = self.failures.entry(index).or_insert(0);
                *failures += 1;
                if *failures > self.config.engine_retries {
                    warn!(index, attempt = item.attempt, error = %e, "Local evaluation failed, giving up");
                    state.mark_unresolved();
                    1
                } else {
                    warn!(index, attempt = item.attempt, error = %e, "Local evaluation failed, will retry");
                    0
                }
            }
        }
    }

    /// Current search depth of every in-flight evaluation.
    pub fn in_flight_depths(&self) -> impl Iterator<Item = u32> + '_ {
        self.active.values().map(|item| *item.depth.borrow())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Abort every in-flight search. Returns how many were torn down.
    pub fn shutdown(&mut self) -> usize {
        let items = std::mem::take(&mut self.active);
        for item in items.values() {
            item.handle.abort();
        }
        items.len()
    }
}

impl<E> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        for item in self.active.values() {
            item.handle.abort();
        }
    }
}
