//! Cooperative cancellation for an in-flight stream
//!
//! A [`CancelGate`] combines a caller-supplied abort predicate with a
//! [`CancellationToken`]. The stream reader consults the gate before handling
//! every item; once it reports abort the token is cancelled so any pending
//! read is woken and the response body is dropped.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

type AbortPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct CancelGate {
    token: CancellationToken,
    predicate: Option<AbortPredicate>,
}

impl CancelGate {
    /// A gate that only aborts when [`abort`](Self::abort) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate that also aborts when `predicate` returns true
    pub fn with_predicate<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            token: CancellationToken::new(),
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Evaluate the predicate and token
    ///
    /// A true predicate trips the token, so every later check agrees.
    pub fn should_abort(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        if let Some(predicate) = &self.predicate
            && predicate()
        {
            self.abort();
            return true;
        }
        false
    }

    /// Abort the stream driven by this gate
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Cancellation gate tripped");
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub fn aborted(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The underlying token, for wiring into other tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl fmt::Debug for CancelGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelGate")
            .field("aborted", &self.token.is_cancelled())
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}
