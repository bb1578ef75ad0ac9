//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;

use chess_core::{EvaluationLine, EvaluationValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::engine::{DepthReporter, LocalEngine};
use crate::error::WorkerError;

/// Number of ranked lines requested per position
pub const MULTI_PV: usize = 2;

/// Process-level options applied after `uci`
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 64,
        }
    }
}

/// One parsed `info` line that carries a usable score
#[derive(Debug, Clone, PartialEq)]
struct InfoLine {
    depth: u32,
    multipv: usize,
    value: EvaluationValue,
    first_move: String,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, options: &EngineOptions) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Engine(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Engine("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| WorkerError::Engine("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine
            .send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        engine
            .send(&format!("setoption name MultiPV value {MULTI_PV}"))
            .await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; EOF means the process died.
    async fn read_line(&mut self, line: &mut String) -> Result<(), WorkerError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| WorkerError::Engine(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(WorkerError::Engine("Stockfish closed its output".into()));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Search `fen` to `depth` and return the ranked lines, White-relative.
    pub async fn analyse(
        &mut self,
        fen: &str,
        depth: u32,
        reporter: &DepthReporter,
    ) -> Result<Vec<EvaluationLine>, WorkerError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let black_to_move = fen.split_whitespace().nth(1) == Some("b");
        let mut ranked: Vec<Option<InfoLine>> = vec![None; MULTI_PV];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") {
                if let Some(d) = value_after(trimmed, "depth") {
                    reporter.report(d.max(0) as u32);
                }
                if let Some(info) = parse_info(trimmed) {
                    if let Some(slot) = ranked.get_mut(info.multipv - 1) {
                        *slot = Some(info);
                    }
                }
            } else if trimmed.starts_with("bestmove") {
                debug!(line = trimmed, "SF >");
                break;
            }
        }

        let lines = ranked
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(i, info)| EvaluationLine {
                rank: i as u32 + 1,
                depth: info.depth,
                move_coordinate: info.first_move,
                value: if black_to_move {
                    info.value.negate()
                } else {
                    info.value
                },
            })
            .collect();

        Ok(lines)
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Spawns a fresh Stockfish process for every evaluation.
#[derive(Debug, Clone)]
pub struct StockfishLauncher {
    path: String,
    options: EngineOptions,
}

impl StockfishLauncher {
    pub fn new(path: impl Into<String>, options: EngineOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

impl LocalEngine for StockfishLauncher {
    async fn evaluate(
        &self,
        fen: &str,
        depth: u32,
        reporter: &DepthReporter,
    ) -> Result<Vec<EvaluationLine>, WorkerError> {
        let mut engine = StockfishEngine::new(&self.path, &self.options).await?;
        let lines = engine.analyse(fen, depth, reporter).await?;
        engine.quit().await;
        Ok(lines)
    }
}

/// Parse an `info` line with an exact score and a pv.
fn parse_info(line: &str) -> Option<InfoLine> {
    if line.contains("lowerbound") || line.contains("upperbound") {
        return None;
    }

    let value = if let Some(cp) = value_after(line, "cp") {
        EvaluationValue::Centipawn(cp)
    } else {
        EvaluationValue::ForcedMate(value_after(line, "mate")?)
    };

    let first_move = parse_pv(line).into_iter().next()?;
    let multipv = value_after(line, "multipv").unwrap_or(1).max(1) as usize;

    Some(InfoLine {
        depth: value_after(line, "depth")?.max(0) as u32,
        multipv,
        value,
        first_move,
    })
}

/// Integer following `key` in an info line
fn value_after(line: &str, key: &str) -> Option<i32> {
    let mut parts = line.split_whitespace();
    parts.by_ref().find(|part| *part == key)?;
    parts.next()?.parse().ok()
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let mut parts = line.split_whitespace();
    if parts.by_ref().find(|part| *part == "pv").is_none() {
        return Vec::new();
    }
    // PV ends at next keyword or end of line
    parts
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(String::from)
        .collect()
}
