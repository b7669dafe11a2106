//! Single-flight operation slots.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use devpanel_protocol::OpFailure;

/// Holds at most one in-flight operation of a kind.
///
/// Every occupant gets a new generation. Completions carry the generation
/// they were issued with, and anything not matching the current occupant is
/// stale and must be discarded.
#[derive(Debug, Default)]
pub struct OpSlot {
    generation: u64,
    active: Option<CancellationToken>,
}

impl OpSlot {
    /// Cancels any previous occupant and reserves the slot for a new one.
    pub fn occupy(&mut self) -> (u64, CancellationToken) {
        if let Some(prev) = self.active.take() {
            prev.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.active = Some(token.clone());
        (self.generation, token)
    }

    /// Cancels the occupant but keeps it current, so its cancellation
    /// completion is still delivered. Returns false when the slot is empty.
    pub fn cancel(&mut self) -> bool {
        match &self.active {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the occupant and makes any completion it sends stale.
    pub fn invalidate(&mut self) {
        if let Some(prev) = self.active.take() {
            prev.cancel();
        }
        self.generation += 1;
    }

    /// Releases the slot if `generation` is the current occupant.
    pub fn finish(&mut self, generation: u64) -> bool {
        if self.active.is_some() && generation == self.generation {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// True while `generation` is current and has not been cancelled.
    pub fn is_live(&self, generation: u64) -> bool {
        generation == self.generation
            && self.active.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Runs `op` on the tokio runtime and reports its outcome through `tx`.
///
/// Cancellation wins over a simultaneously ready result and is reported as
/// [`OpFailure::Cancelled`]; the completion is always sent asynchronously.
pub fn spawn_op<T, C, F, W>(
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<C>,
    op: F,
    wrap: W,
) where
    T: Send + 'static,
    C: Send + 'static,
    F: Future<Output = Result<T, OpFailure>> + Send + 'static,
    W: FnOnce(Result<T, OpFailure>) -> C + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OpFailure::Cancelled),
            result = op => result,
        };
        if tx.send(wrap(outcome)).is_err() {
            trace!("completion dropped, owner gone");
        }
    });
}
