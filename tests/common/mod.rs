#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chess_core::{EvaluationLine, EvaluationValue};
use eval_worker::{DepthReporter, LocalEngine, LookupOutcome, RemoteLookup, WorkerError};

/// Build SAN tokens from string literals.
pub fn moves(sans: &[&str]) -> Vec<String> {
    sans.iter().map(|s| s.to_string()).collect()
}

/// Two ranked lines as a remote source would return them.
pub fn remote_lines(best_cp: i32) -> Vec<EvaluationLine> {
    vec![
        EvaluationLine {
            rank: 1,
            depth: 16,
            move_coordinate: "g1f3".to_string(),
            value: EvaluationValue::Centipawn(best_cp),
        },
        EvaluationLine {
            rank: 2,
            depth: 16,
            move_coordinate: "b1c3".to_string(),
            value: EvaluationValue::Centipawn(best_cp - 10),
        },
    ]
}

/// Remote lookup answering from a fixed FEN -> outcome table; everything else misses.
#[derive(Default)]
pub struct ScriptedLookup {
    answers: HashMap<String, LookupOutcome>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, fen: &str, outcome: LookupOutcome) -> Self {
        self.answers.insert(fen.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteLookup for ScriptedLookup {
    async fn lookup(&self, fen: &str) -> LookupOutcome {
        self.calls.lock().unwrap().push(fen.to_string());
        self.answers
            .get(fen)
            .cloned()
            .unwrap_or(LookupOutcome::Unavailable)
    }
}

/// Local engine that sleeps for `delay`, then answers with two lines.
///
/// Tracks how many evaluations run at once and which FENs were searched.
pub struct ScriptedEngine {
    delay: Duration,
    /// FEN -> failures left before it succeeds
    flaky: Mutex<HashMap<String, u32>>,
    broken: HashSet<String>,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            flaky: Mutex::new(HashMap::new()),
            broken: HashSet::new(),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` evaluations of `fen`.
    pub fn flaky(self, fen: &str, times: u32) -> Self {
        self.flaky.lock().unwrap().insert(fen.to_string(), times);
        self
    }

    /// Fail every evaluation of `fen`.
    pub fn broken(mut self, fen: &str) -> Self {
        self.broken.insert(fen.to_string());
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, fen: &str) -> usize {
        self.calls().iter().filter(|f| *f == fen).count()
    }

    fn should_fail(&self, fen: &str) -> bool {
        if self.broken.contains(fen) {
            return true;
        }
        let mut flaky = self.flaky.lock().unwrap();
        match flaky.get_mut(fen) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

impl LocalEngine for ScriptedEngine {
    async fn evaluate(
        &self,
        fen: &str,
        depth: u32,
        reporter: &DepthReporter,
    ) -> Result<Vec<EvaluationLine>, WorkerError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(fen.to_string());

        reporter.report(depth / 2);
        tokio::time::sleep(self.delay).await;
        reporter.report(depth);

        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(fen) {
            return Err(WorkerError::Engine("scripted failure".into()));
        }

        Ok(vec![
            EvaluationLine {
                rank: 1,
                depth,
                move_coordinate: "a2a3".to_string(),
                value: EvaluationValue::Centipawn(5),
            },
            EvaluationLine {
                rank: 2,
                depth,
                move_coordinate: "h2h3".to_string(),
                value: EvaluationValue::Centipawn(-5),
            },
        ])
    }
}

/// Remote lookup that never answers within any reasonable budget.
#[derive(Default)]
pub struct HangingLookup {
    calls: AtomicUsize,
}

impl HangingLookup {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteLookup for HangingLookup {
    async fn lookup(&self, _fen: &str) -> LookupOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        LookupOutcome::Unavailable
    }
}
