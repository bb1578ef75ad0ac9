//! Game record parsing: a lightweight regex-based PGN reader.
//!
//! Produces the ordered SAN move list plus the headers the pipeline cares about.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RecordError;
use crate::game_data::{GameMetadata, GameRecord};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("header pattern"));

static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.+").expect("move number pattern"));

static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[KQRBN][a-h]?[1-8]?x?[a-h][1-8]|[a-h](?:x[a-h])?[1-8](?:=?[QRBN])?|O-O-O|O-O)[+#]?$",
    )
    .expect("san pattern")
});

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Parse a PGN game record into headers and SAN move tokens.
///
/// A record with headers but no movetext is valid and has no moves.
pub fn parse_game_record(text: &str) -> Result<GameRecord, RecordError> {
    if text.trim().is_empty() {
        return Err(RecordError::Malformed("empty game record".into()));
    }

    let mut metadata = GameMetadata::default();
    let mut setup = None;
    let mut fen = None;
    let mut header_count = 0usize;

    for cap in HEADER_RE.captures_iter(text) {
        header_count += 1;
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = Some(value),
            "Black" => metadata.black = Some(value),
            "Result" => metadata.result = Some(value),
            "Date" => metadata.date = Some(value),
            "Event" => metadata.event = Some(value),
            "TimeControl" => metadata.time_control = Some(value),
            "ECO" => metadata.eco = Some(value),
            "SetUp" => setup = Some(value),
            "FEN" => fen = Some(value),
            _ => {}
        }
    }

    let movetext = HEADER_RE.replace_all(text, "");
    let moves = extract_moves(&strip_commentary(&movetext)?)?;

    if moves.is_empty() && header_count == 0 {
        return Err(RecordError::Malformed("no headers or moves found".into()));
    }

    let start_fen = match setup.as_deref() {
        Some("0") => None,
        _ => fen.filter(|f| !f.trim().is_empty()),
    };

    Ok(GameRecord {
        metadata,
        start_fen,
        moves,
    })
}

/// Drop comments (`{...}`, `; ...`) and variations (nested `(...)`).
fn strip_commentary(movetext: &str) -> Result<String, RecordError> {
    let mut out = String::with_capacity(movetext.len());
    let mut chars = movetext.chars();
    let mut variation_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !chars.by_ref().any(|c| c == '}') {
                    return Err(RecordError::Malformed("unterminated comment".into()));
                }
                out.push(' ');
            }
            ';' => {
                chars.by_ref().find(|&c| c == '\n');
                out.push(' ');
            }
            '}' => return Err(RecordError::Malformed("unexpected '}'".into())),
            '(' => variation_depth += 1,
            ')' => {
                if variation_depth == 0 {
                    return Err(RecordError::Malformed("unexpected ')'".into()));
                }
                variation_depth -= 1;
                out.push(' ');
            }
            _ if variation_depth > 0 => {}
            _ => out.push(c),
        }
    }

    if variation_depth > 0 {
        return Err(RecordError::Malformed("unterminated variation".into()));
    }
    Ok(out)
}

fn extract_moves(movetext: &str) -> Result<Vec<String>, RecordError> {
    let mut moves = Vec::new();

    for raw in movetext.split_whitespace() {
        // "12.e4" and "12..." both carry the move number as a prefix
        let token = MOVE_NUMBER_RE.replace(raw, "");
        let token = token.trim_end_matches(&['!', '?'][..]);

        if token.is_empty() || RESULT_TOKENS.contains(&token) || is_nag(token) {
            continue;
        }

        let token = if token.starts_with("0-0") {
            token.replace('0', "O")
        } else {
            token.to_string()
        };

        if !SAN_RE.is_match(&token) {
            return Err(RecordError::Malformed(format!("unexpected token {raw:?}")));
        }
        moves.push(token);
    }

    Ok(moves)
}

fn is_nag(token: &str) -> bool {
    token
        .strip_prefix('$')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
