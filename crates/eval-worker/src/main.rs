//! Game evaluation CLI
//!
//! Reads a PGN game record, evaluates every position (cloud first, local
//! Stockfish for the rest) and prints the evaluated positions as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing::info;

use eval_worker::chess_core::pgn::parse_game_record;
use eval_worker::chess_core::STANDARD_START_FEN;
use eval_worker::config::WorkerConfig;
use eval_worker::stockfish::{EngineOptions, StockfishLauncher};
use eval_worker::{acquire_evaluations, CloudEvalClient, DisabledLookup, EvaluationRun, RemoteLookup};

#[derive(Debug, Default)]
struct CliArgs {
    depth: Option<u32>,
    fen: Option<String>,
    pgn_path: Option<String>,
}

/// Parse `[--depth N] [--fen FEN] [PGN_FILE]`
fn parse_args() -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--depth" => {
                let value = args.next().context("--depth needs a value")?;
                cli.depth = Some(value.parse::<u32>().context("--depth must be a positive integer")?);
            }
            "--fen" => cli.fen = Some(args.next().context("--fen needs a value")?),
            _ if arg.starts_with("--") => anyhow::bail!("unknown option {arg}"),
            _ => cli.pgn_path = Some(arg),
        }
    }

    Ok(cli)
}

async fn read_record(path: Option<&str>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {path}")),
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}

async fn evaluate<R: RemoteLookup>(
    lookup: &R,
    config: &WorkerConfig,
    start_fen: &str,
    moves: &[String],
) -> anyhow::Result<EvaluationRun> {
    let engine = Arc::new(StockfishLauncher::new(
        config.stockfish_path.clone(),
        EngineOptions {
            threads: config.engine_threads,
            hash_mb: config.engine_hash_mb,
        },
    ));

    let run = acquire_evaluations(
        lookup,
        engine,
        start_fen,
        moves,
        &config.analysis_options(),
        None,
    )
    .await?;
    Ok(run)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args()?;
    let mut config = WorkerConfig::load()?;
    if let Some(depth) = cli.depth {
        anyhow::ensure!(depth > 0, "--depth must be a positive integer");
        config.target_depth = depth;
    }

    let text = read_record(cli.pgn_path.as_deref()).await?;
    let record = parse_game_record(&text)?;
    let start_fen = cli
        .fen
        .or(record.start_fen)
        .unwrap_or_else(|| STANDARD_START_FEN.to_string());

    info!(
        moves = record.moves.len(),
        white = record.metadata.white.as_deref().unwrap_or("?"),
        black = record.metadata.black.as_deref().unwrap_or("?"),
        "Parsed game record"
    );

    let run = if config.cloud_eval_enabled {
        let lookup = CloudEvalClient::new(
            config.cloud_eval_url.clone(),
            config.target_depth,
            Duration::from_secs(config.cloud_eval_timeout_secs),
            Duration::from_millis(config.cloud_eval_min_interval_ms),
        )?;
        evaluate(&lookup, &config, &start_fen, &record.moves).await?
    } else {
        evaluate(&DisabledLookup, &config, &start_fen, &record.moves).await?
    };

    info!(
        positions = run.states.len(),
        unresolved = run.unresolved_count(),
        outcome = ?run.outcome,
        "Evaluation finished"
    );

    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}
