//! Board replay: move tokens -> one `BoardState` per ply.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use crate::error::ReplayError;
use crate::position::{BoardState, MoveNotation};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Replay `tokens` (SAN) from `starting_fen`.
///
/// Returns `tokens.len() + 1` states, the first being the starting position.
/// Fails on the first token that is not a legal move; nothing partial is returned.
pub fn replay(starting_fen: &str, tokens: &[String]) -> Result<Vec<BoardState>, ReplayError> {
    let mut pos = load_position(starting_fen)?;

    let mut states = Vec::with_capacity(tokens.len() + 1);
    states.push(BoardState::initial(encode(&pos)));

    for (i, token) in tokens.iter().enumerate() {
        let mv = apply_token(&mut pos, token).ok_or_else(|| ReplayError::InvalidMove {
            ply: i + 1,
            token: token.clone(),
        })?;
        states.push(BoardState::after_move(encode(&pos), mv));
    }

    Ok(states)
}

fn load_position(fen: &str) -> Result<Chess, ReplayError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| ReplayError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| ReplayError::InvalidFen(format!("{fen}: {e}")))
}

/// Apply one SAN token, returning its notation pair. `None` if unparsable or illegal.
fn apply_token(pos: &mut Chess, token: &str) -> Option<MoveNotation> {
    let san_plus: SanPlus = token.trim().parse().ok()?;
    let mv = san_plus.san.to_move(&*pos).ok()?;
    let uci = mv.to_uci(CastlingMode::Standard).to_string();
    pos.play_unchecked(mv);
    Some(MoveNotation {
        san: token.trim().to_string(),
        uci,
    })
}

fn encode(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}
