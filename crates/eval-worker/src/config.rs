//! Worker configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::WorkerError;
use crate::orchestrator::AnalysisOptions;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// `Threads` option sent to every Stockfish process
    pub engine_threads: u32,

    /// `Hash` option (MB) sent to every Stockfish process
    pub engine_hash_mb: u32,

    /// Search depth requested per local evaluation
    pub target_depth: u32,

    /// Maximum concurrently running Stockfish processes
    pub max_engines: usize,

    /// Extra attempts after a failed local evaluation
    pub engine_retries: u32,

    /// Scheduler tick during the local pass
    pub tick_interval_ms: u64,

    /// Budget for a whole analysis run (None = unbounded)
    pub analysis_timeout_secs: Option<u64>,

    /// Query the cloud-eval service before falling back to Stockfish
    pub cloud_eval_enabled: bool,

    /// Base URL of the cloud-eval service
    pub cloud_eval_url: String,

    pub cloud_eval_timeout_secs: u64,

    /// Minimum spacing between cloud-eval requests
    pub cloud_eval_min_interval_ms: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            stockfish_path = %config.stockfish_path,
            target_depth = config.target_depth,
            max_engines = config.max_engines,
            cloud_eval = config.cloud_eval_enabled,
            "Worker config loaded"
        );
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup (the environment, in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            stockfish_path: lookup("STOCKFISH_PATH")
                .unwrap_or_else(|| "/usr/local/bin/stockfish".to_string()),
            engine_threads: parse_or(&lookup, "ENGINE_THREADS", 1)?,
            engine_hash_mb: parse_or(&lookup, "ENGINE_HASH_MB", 64)?,
            target_depth: parse_or(&lookup, "TARGET_DEPTH", 16)?,
            max_engines: parse_or(&lookup, "MAX_ENGINES", 8)?,
            engine_retries: parse_or(&lookup, "ENGINE_RETRIES", 1)?,
            tick_interval_ms: parse_or(&lookup, "TICK_INTERVAL_MS", 100)?,
            analysis_timeout_secs: parse_opt(&lookup, "ANALYSIS_TIMEOUT_SECS")?,
            cloud_eval_enabled: parse_or(&lookup, "CLOUD_EVAL_ENABLED", true)?,
            cloud_eval_url: lookup("CLOUD_EVAL_URL")
                .unwrap_or_else(|| "https://lichess.org".to_string()),
            cloud_eval_timeout_secs: parse_or(&lookup, "CLOUD_EVAL_TIMEOUT_SECS", 10)?,
            cloud_eval_min_interval_ms: parse_or(&lookup, "CLOUD_EVAL_MIN_INTERVAL_MS", 0)?,
        };

        if config.max_engines == 0 {
            return Err(WorkerError::Config("MAX_ENGINES must be at least 1".into()));
        }
        if config.target_depth == 0 {
            return Err(WorkerError::Config("TARGET_DEPTH must be at least 1".into()));
        }
        if config.tick_interval_ms == 0 {
            return Err(WorkerError::Config("TICK_INTERVAL_MS must be at least 1".into()));
        }

        Ok(config)
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            target_depth: self.target_depth,
            max_concurrency: self.max_engines,
            engine_retries: self.engine_retries,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            timeout: self.analysis_timeout_secs.map(Duration::from_secs),
        }
    }
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Result<Option<T>, WorkerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, WorkerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
