//! Scheduling tests for the evaluation orchestrator.
//!
//! Remote and local evaluation are scripted so the tests can check which source
//! evaluated which ply, how many searches ran at once, and how progress moved.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chess_core::{replay, EvaluationSource, EvaluationValue, ReplayError, STANDARD_START_FEN};
use common::{moves, remote_lines, HangingLookup, ScriptedEngine, ScriptedLookup};
use eval_worker::{
    acquire_evaluations, AnalysisOptions, DisabledLookup, LookupOutcome, ProgressPhase, RunOutcome,
    WorkerError,
};

fn fast_options() -> AnalysisOptions {
    AnalysisOptions {
        tick_interval: Duration::from_millis(5),
        ..AnalysisOptions::default()
    }
}

/// FENs of every ply of `sans`, for scripting lookups.
fn fens(sans: &[&str]) -> Vec<String> {
    replay(STANDARD_START_FEN, &moves(sans))
        .unwrap()
        .into_iter()
        .map(|s| s.fen)
        .collect()
}

#[tokio::test]
async fn test_first_remote_miss_routes_rest_to_local() {
    let sans = ["e4", "e5", "Nf3", "Nc6"];
    let fens = fens(&sans);
    let lookup = ScriptedLookup::new()
        .answer(&fens[1], LookupOutcome::Hit(remote_lines(30)))
        // would be a hit, but it comes after the first miss
        .answer(&fens[3], LookupOutcome::Hit(remote_lines(40)));
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(10)));

    let run = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.outcome, RunOutcome::Complete);
    assert_eq!(run.states.len(), 5);
    assert_eq!(lookup.calls(), vec![fens[1].clone(), fens[2].clone()]);

    assert_eq!(run.states[1].evaluation_source, Some(EvaluationSource::Remote));
    for i in [0, 2, 3, 4] {
        assert_eq!(run.states[i].evaluation_source, Some(EvaluationSource::Local), "ply {i}");
        assert_eq!(engine.calls_for(&fens[i]), 1, "ply {i}");
    }
    assert_eq!(engine.calls_for(&fens[1]), 0);

    // fallback only on the state right before the miss
    assert_eq!(run.states[1].fallback_evaluation, Some(EvaluationValue::Centipawn(30)));
    assert_eq!(run.states[0].fallback_evaluation, None);
    assert!(run.states[2..].iter().all(|s| s.fallback_evaluation.is_none()));
}

#[tokio::test]
async fn test_all_remote_hits_leave_only_start_position_local() {
    let sans = ["d4", "d5"];
    let fens = fens(&sans);
    let lookup = ScriptedLookup::new()
        .answer(&fens[1], LookupOutcome::Hit(remote_lines(20)))
        .answer(&fens[2], LookupOutcome::Hit(remote_lines(25)));
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));

    let run = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(lookup.calls(), vec![fens[1].clone(), fens[2].clone()]);
    assert_eq!(engine.calls(), vec![fens[0].clone()]);
    assert_eq!(run.states[0].evaluation_source, Some(EvaluationSource::Local));
    assert_eq!(run.states[2].evaluation_source, Some(EvaluationSource::Remote));
    assert_eq!(run.states[2].candidate_lines.as_ref().map(|l| l.len()), Some(2));
    assert!(run.states.iter().all(|s| s.fallback_evaluation.is_none()));
}

#[tokio::test]
async fn test_single_line_hit_counts_as_miss() {
    let sans = ["e4"];
    let fens = fens(&sans);
    let mut one_line = remote_lines(50);
    one_line.truncate(1);
    let lookup = ScriptedLookup::new().answer(&fens[1], LookupOutcome::Hit(one_line));
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));

    let run = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.states[1].evaluation_source, Some(EvaluationSource::Local));
    assert_eq!(run.states[1].candidate_lines.as_ref().unwrap()[0].move_coordinate, "a2a3");
    // start position has no lines yet, so the fallback is neutral
    assert_eq!(run.states[0].fallback_evaluation, Some(EvaluationValue::ZERO));
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let sans = ["e4", "e5", "Nf3", "Nc6"];
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(40)));
    let options = AnalysisOptions {
        max_concurrency: 2,
        ..fast_options()
    };

    let run = acquire_evaluations(
        &DisabledLookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &options,
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.outcome, RunOutcome::Complete);
    assert_eq!(engine.calls().len(), 5);
    assert!(engine.peak_concurrency() <= 2, "peak {}", engine.peak_concurrency());
    assert!(run.states.iter().all(|s| s.has_lines()));
}

#[tokio::test]
async fn test_failed_evaluation_is_retried_once() {
    let sans = ["e4", "c5"];
    let fens = fens(&sans);
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)).flaky(&fens[2], 1));

    let run = acquire_evaluations(
        &DisabledLookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(engine.calls_for(&fens[2]), 2);
    assert_eq!(run.states[2].evaluation_source, Some(EvaluationSource::Local));
    assert_eq!(run.unresolved_count(), 0);
}

#[tokio::test]
async fn test_persistent_failure_marks_unresolved() {
    let sans = ["e4", "c5"];
    let fens = fens(&sans);
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)).broken(&fens[1]));

    let run = acquire_evaluations(
        &DisabledLookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.outcome, RunOutcome::Complete);
    assert_eq!(engine.calls_for(&fens[1]), 2);
    assert!(run.states[1].is_unresolved());
    assert!(run.states[1].candidate_lines.is_none());
    assert!(run.states[0].has_lines() && run.states[2].has_lines());
    assert_eq!(run.unresolved_count(), 1);
}

#[tokio::test]
async fn test_no_retries_configured() {
    let sans = ["e4"];
    let fens = fens(&sans);
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)).broken(&fens[0]));
    let options = AnalysisOptions {
        engine_retries: 0,
        ..fast_options()
    };

    let run = acquire_evaluations(
        &DisabledLookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&sans),
        &options,
        None,
    )
    .await
    .unwrap();

    assert_eq!(engine.calls_for(&fens[0]), 1);
    assert!(run.states[0].is_unresolved());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_100() {
    let sans = ["e4", "e5", "Nf3"];
    let fens = fens(&sans);
    let lookup = ScriptedLookup::new().answer(&fens[1], LookupOutcome::Hit(remote_lines(10)));
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(20)));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    acquire_evaluations(
        &lookup,
        engine,
        STANDARD_START_FEN,
        &moves(&sans),
        &AnalysisOptions {
            max_concurrency: 1,
            ..fast_options()
        },
        Some(tx),
    )
    .await
    .unwrap();

    let mut seen = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        seen.push(progress.percent);
    }

    assert!(seen.len() > 2);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last().copied(), Some(100.0));
    assert!(seen[..seen.len() - 1].iter().all(|p| *p < 100.0), "{seen:?}");
}

#[tokio::test]
async fn test_timeout_tears_down_and_marks_unresolved() {
    let sans = ["e4", "e5"];
    let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(30)));
    let options = AnalysisOptions {
        timeout: Some(Duration::from_millis(100)),
        ..fast_options()
    };

    let started = Instant::now();
    let run = acquire_evaluations(
        &DisabledLookup,
        engine,
        STANDARD_START_FEN,
        &moves(&sans),
        &options,
        None,
    )
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(run.outcome, RunOutcome::TimedOut);
    assert_eq!(run.unresolved_count(), 3);
}

#[tokio::test]
async fn test_illegal_move_fails_before_any_work() {
    let lookup = ScriptedLookup::new();
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));

    let err = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&["e4", "e5", "Ke3"]),
        &fast_options(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        WorkerError::Replay(ReplayError::InvalidMove { ply: 3, .. })
    ));
    assert!(lookup.calls().is_empty());
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_empty_game_evaluates_start_position_locally() {
    let lookup = ScriptedLookup::new();
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));

    let run = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &[],
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(run.states.len(), 1);
    assert!(lookup.calls().is_empty());
    assert_eq!(run.states[0].evaluation_source, Some(EvaluationSource::Local));
}

#[tokio::test]
async fn test_hanging_remote_lookup_is_bounded_by_deadline() {
    let lookup = HangingLookup::default();
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));
    let options = AnalysisOptions {
        timeout: Some(Duration::from_millis(100)),
        ..fast_options()
    };

    let started = Instant::now();
    let run = acquire_evaluations(
        &lookup,
        engine.clone(),
        STANDARD_START_FEN,
        &moves(&["e4", "e5"]),
        &options,
        None,
    )
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(run.outcome, RunOutcome::TimedOut);
    assert_eq!(lookup.calls(), 1);
    assert_eq!(run.unresolved_count(), 3);
    assert!(run.states.iter().all(|s| s.candidate_lines.is_none()));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_remote_miss_and_timeout_report_progress() {
    let engine = Arc::new(ScriptedEngine::new(Duration::from_secs(30)));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let options = AnalysisOptions {
        timeout: Some(Duration::from_millis(100)),
        ..fast_options()
    };

    let run = acquire_evaluations(
        &DisabledLookup,
        engine,
        STANDARD_START_FEN,
        &moves(&["e4", "e5"]),
        &options,
        Some(tx),
    )
    .await
    .unwrap();
    assert_eq!(run.outcome, RunOutcome::TimedOut);

    let mut seen = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        seen.push(progress);
    }

    // the miss at ply 1 is reported before the local pass starts
    assert_eq!(seen[0].phase, ProgressPhase::Remote);
    assert_eq!(seen[0].percent, 0.0);
    assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(seen.last().map(|p| p.percent), Some(100.0));
}

#[tokio::test]
async fn test_run_serializes_for_report_stage() {
    let engine = Arc::new(ScriptedEngine::new(Duration::from_millis(5)));

    let run = acquire_evaluations(
        &DisabledLookup,
        engine,
        STANDARD_START_FEN,
        &moves(&["e4"]),
        &fast_options(),
        None,
    )
    .await
    .unwrap();

    let json = serde_json::to_value(&run).unwrap();
    assert_eq!(json["outcome"], "complete");

    let start = &json["states"][0];
    assert!(start.get("move").is_none());
    assert_eq!(
        start["fallback_evaluation"],
        serde_json::json!({ "type": "cp", "value": 0 })
    );

    let first = &json["states"][1];
    assert_eq!(first["move"]["san"], "e4");
    assert_eq!(first["move"]["uci"], "e2e4");
    assert_eq!(first["evaluation_source"], "local");
    assert_eq!(first["candidate_lines"][0]["rank"], 1);
    assert_eq!(first["candidate_lines"][0]["move_coordinate"], "a2a3");
    assert_eq!(
        first["candidate_lines"][1]["value"],
        serde_json::json!({ "type": "cp", "value": -5 })
    );
}
