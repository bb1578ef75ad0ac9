//! Lichess cloud-eval lookup client

use std::future::Future;
use std::time::Duration;

use chess_core::{EvaluationLine, EvaluationValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::WorkerError;

/// The cloud encodes castling as king-takes-rook; we use king-moves-two-squares.
const CASTLING_FIXES: [(&str, &str); 4] = [
    ("e8h8", "e8g8"),
    ("e1h1", "e1g1"),
    ("e8a8", "e8c8"),
    ("e1a1", "e1c1"),
];

/// Result of a single remote lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Hit(Vec<EvaluationLine>),
    Unavailable,
}

impl LookupOutcome {
    /// Only a full two-line answer is trusted by the scheduler.
    pub fn authoritative_lines(self) -> Option<Vec<EvaluationLine>> {
        match self {
            Self::Hit(lines) if lines.len() == 2 => Some(lines),
            _ => None,
        }
    }
}

/// A cache or service that may already know a position's evaluation.
pub trait RemoteLookup: Send + Sync {
    fn lookup(&self, fen: &str) -> impl Future<Output = LookupOutcome> + Send;
}

/// Lookup used when the cloud is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLookup;

impl RemoteLookup for DisabledLookup {
    async fn lookup(&self, _fen: &str) -> LookupOutcome {
        LookupOutcome::Unavailable
    }
}

#[derive(Debug, Deserialize)]
struct CloudEvalResponse {
    pvs: Vec<CloudPv>,
}

#[derive(Debug, Deserialize)]
struct CloudPv {
    #[serde(default)]
    moves: String,
    cp: Option<i32>,
    mate: Option<i32>,
}

pub struct CloudEvalClient {
    client: Client,
    base_url: String,
    depth: u32,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl CloudEvalClient {
    /// `depth` is the nominal depth stamped on every returned line.
    pub fn new(
        base_url: impl Into<String>,
        depth: u32,
        timeout: Duration,
        min_interval: Duration,
    ) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .user_agent("EvalWorker/1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::Config(format!("HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            depth,
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Space requests at least `min_interval` apart
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch(&self, fen: &str) -> Result<Option<String>, reqwest::Error> {
        self.throttle().await;

        let resp = self
            .client
            .get(format!("{}/api/cloud-eval", self.base_url))
            .query(&[("fen", fen), ("multiPv", "2")])
            .send()
            .await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Cloud eval rate limited");
            return Ok(None);
        }
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Cloud eval miss");
            return Ok(None);
        }

        resp.text().await.map(Some)
    }
}

impl RemoteLookup for CloudEvalClient {
    async fn lookup(&self, fen: &str) -> LookupOutcome {
        let body = match self.fetch(fen).await {
            Ok(Some(body)) => body,
            Ok(None) => return LookupOutcome::Unavailable,
            Err(e) => {
                warn!(error = %e, "Cloud eval request failed");
                return LookupOutcome::Unavailable;
            }
        };

        match parse_cloud_eval(&body, self.depth) {
            Some(lines) => LookupOutcome::Hit(lines),
            None => {
                warn!("Malformed cloud eval payload");
                LookupOutcome::Unavailable
            }
        }
    }
}

/// Normalize a cloud-eval payload. `None` if the payload is malformed.
pub fn parse_cloud_eval(body: &str, depth: u32) -> Option<Vec<EvaluationLine>> {
    let response: CloudEvalResponse = serde_json::from_str(body).ok()?;

    response
        .pvs
        .into_iter()
        .enumerate()
        .map(|(i, pv)| {
            let value = match (pv.cp, pv.mate) {
                (Some(cp), _) => EvaluationValue::Centipawn(cp),
                (None, Some(mate)) => EvaluationValue::ForcedMate(mate),
                (None, None) => return None,
            };
            let first = pv.moves.split_whitespace().next()?;
            Some(EvaluationLine {
                rank: i as u32 + 1,
                depth,
                move_coordinate: fix_castling(first).to_string(),
                value,
            })
        })
        .collect()
}

/// Rewrite king-takes-rook castling to the internal convention.
pub fn fix_castling(uci: &str) -> &str {
    for (cloud, fixed) in CASTLING_FIXES {
        if cloud == uci {
            return fixed;
        }
    }
    uci
}
