//! Evaluation acquisition for replayed games.
//!
//! Positions are looked up in the Lichess cloud first and evaluated with a
//! bounded pool of local Stockfish processes once the cloud stops answering.

pub use chess_core;

pub mod cloud_eval;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod stockfish;

pub use cloud_eval::{CloudEvalClient, DisabledLookup, LookupOutcome, RemoteLookup};
pub use engine::{DepthReporter, LocalEngine};
pub use error::WorkerError;
pub use orchestrator::{acquire_evaluations, AnalysisOptions, EvaluationRun, RunOutcome};
pub use progress::{Progress, ProgressPhase};
