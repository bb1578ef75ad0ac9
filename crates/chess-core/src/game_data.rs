use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: Option<String>,
    pub event: Option<String>,
    pub time_control: Option<String>,
    pub eco: Option<String>,
}

/// A parsed game record, ready for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub metadata: GameMetadata,
    /// Starting position from a `SetUp`/`FEN` header pair, if any.
    pub start_fen: Option<String>,
    pub moves: Vec<String>, // SAN notation
}
