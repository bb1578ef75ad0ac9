//! Per-ply data model shared by replay and evaluation.

use serde::{Deserialize, Serialize};

/// Engine evaluation, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EvaluationValue {
    #[serde(rename = "cp")]
    Centipawn(i32),
    /// Plies to mate; positive = White mates, negative = Black mates.
    #[serde(rename = "mate")]
    ForcedMate(i32),
}

impl EvaluationValue {
    /// Neutral evaluation used when nothing better is known.
    pub const ZERO: EvaluationValue = EvaluationValue::Centipawn(0);

    /// Flip perspective (side-to-move <-> White).
    pub fn negate(self) -> Self {
        match self {
            Self::Centipawn(cp) => Self::Centipawn(-cp),
            Self::ForcedMate(m) => Self::ForcedMate(-m),
        }
    }
}

/// One candidate continuation for a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationLine {
    /// 1-based, 1 = best
    pub rank: u32,
    pub depth: u32,
    /// UCI move this line recommends
    pub move_coordinate: String,
    pub value: EvaluationValue,
}

/// The move that produced a state, in both notations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNotation {
    pub san: String,
    pub uci: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    Remote,
    Local,
    Unresolved,
}

/// One ply of a replayed game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardState {
    pub fen: String,
    /// Absent only for the starting position.
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub mv: Option<MoveNotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_lines: Option<Vec<EvaluationLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_evaluation: Option<EvaluationValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_source: Option<EvaluationSource>,
}

impl BoardState {
    pub fn initial(fen: String) -> Self {
        Self {
            fen,
            mv: None,
            candidate_lines: None,
            fallback_evaluation: None,
            evaluation_source: None,
        }
    }

    pub fn after_move(fen: String, mv: MoveNotation) -> Self {
        Self {
            mv: Some(mv),
            ..Self::initial(fen)
        }
    }

    pub fn has_lines(&self) -> bool {
        self.candidate_lines.is_some()
    }

    pub fn is_unresolved(&self) -> bool {
        self.evaluation_source == Some(EvaluationSource::Unresolved)
    }

    /// Evaluated, or given up on. Either way no more work is scheduled.
    pub fn is_settled(&self) -> bool {
        self.has_lines() || self.is_unresolved()
    }

    pub fn best_line(&self) -> Option<&EvaluationLine> {
        self.candidate_lines
            .as_ref()
            .and_then(|lines| lines.iter().find(|l| l.rank == 1).or(lines.first()))
    }

    /// Store lines unless some source already did. Returns whether they were stored.
    pub fn record_lines(&mut self, lines: Vec<EvaluationLine>, source: EvaluationSource) -> bool {
        if self.has_lines() {
            return false;
        }
        self.candidate_lines = Some(lines);
        self.evaluation_source = Some(source);
        true
    }

    pub fn mark_unresolved(&mut self) {
        if !self.has_lines() {
            self.evaluation_source = Some(EvaluationSource::Unresolved);
        }
    }
}
