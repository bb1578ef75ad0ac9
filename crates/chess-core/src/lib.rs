//! Chess-side building blocks for game evaluation.
//!
//! Parses game records into move tokens, replays them on a virtual board and
//! defines the per-ply data model the evaluation pipeline fills in.

pub mod error;
pub mod game_data;
pub mod pgn;
pub mod position;
pub mod replay;

pub use error::{RecordError, ReplayError};
pub use game_data::{GameMetadata, GameRecord};
pub use position::{BoardState, EvaluationLine, EvaluationSource, EvaluationValue, MoveNotation};
pub use replay::{replay, STANDARD_START_FEN};
