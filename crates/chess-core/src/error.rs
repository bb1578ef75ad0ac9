use thiserror::Error;

/// Failure to turn a game record into move tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed game record: {0}")]
    Malformed(String),
}

/// Failure while replaying move tokens on the virtual board.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Invalid starting FEN: {0}")]
    InvalidFen(String),

    /// `ply` is 1-based: the first move of the list is ply 1.
    #[error("Invalid move {token:?} at ply {ply}")]
    InvalidMove { ply: usize, token: String },
}
