//! Local evaluation engine seam.

use std::future::Future;

use chess_core::EvaluationLine;
use tokio::sync::watch;

use crate::error::WorkerError;

/// Publishes the depth an in-flight search has reached. The value never decreases.
#[derive(Debug)]
pub struct DepthReporter {
    tx: watch::Sender<u32>,
}

impl DepthReporter {
    pub fn channel() -> (Self, watch::Receiver<u32>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }

    pub fn report(&self, depth: u32) {
        self.tx.send_if_modified(|current| {
            if depth > *current {
                *current = depth;
                true
            } else {
                false
            }
        });
    }
}

/// Something that can search a position to a fixed depth.
///
/// Implementations return up to two ranked lines with White-relative values.
/// An empty list means the position has no legal continuation.
pub trait LocalEngine: Send + Sync + 'static {
    fn evaluate(
        &self,
        fen: &str,
        depth: u32,
        reporter: &DepthReporter,
    ) -> impl Future<Output = Result<Vec<EvaluationLine>, WorkerError>> + Send;
}
