//! Worker error types

use thiserror::Error;

use chess_core::{RecordError, ReplayError};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stockfish error: {0}")]
    Engine(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
