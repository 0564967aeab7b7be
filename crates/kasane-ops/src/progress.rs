//! Progress reporting and cooperative cancellation.
//!
//! Operations report coarse-grained milestones (start, preparation, core
//! computation, formatting, completion) through a [`ProgressSink`]. The
//! sink is a fire-and-forget collaborator: it must tolerate being called
//! many times in rapid succession and it can never fail an operation.
//!
//! Cancellation is cooperative. A [`CancelToken`] is a shared flag checked
//! by the contract at phase boundaries and by iterative algorithms once
//! per iteration; flipping it makes the in-flight run finish early with
//! [`OperationError::Cancelled`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::OperationError;

/// Receives progress milestones during [`Operation::apply`](crate::Operation::apply).
///
/// Implementations must not block for long and must swallow their own
/// delivery failures; reporting never propagates errors back into the
/// operation.
pub trait ProgressSink {
    /// Called with a percentage in `[0, 100]` and a short human-readable
    /// milestone message.
    fn report(&self, percent: u8, message: &str);
}

/// Sink that discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _percent: u8, _message: &str) {}
}

/// Shared cancellation flag for one run.
///
/// Cloning shares the flag; the coordinator keeps one clone and moves the
/// other into the worker.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress handle passed through an operation run: a sink for milestone
/// reports plus the run's cancellation token.
pub struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> Progress<'a> {
    /// Pair a sink with a cancellation token.
    #[must_use]
    pub fn new(sink: &'a dyn ProgressSink, cancel: CancelToken) -> Self {
        Self { sink, cancel }
    }

    /// A handle that reports nowhere and can never be cancelled. Useful
    /// for synchronous callers and tests.
    #[must_use]
    pub fn silent() -> Progress<'static> {
        Progress::new(&NullSink, CancelToken::new())
    }

    /// Report a milestone. The percentage is clamped to at most 100.
    pub fn report(&self, percent: u8, message: &str) {
        self.sink.report(percent.min(100), message);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Phase-boundary cancellation check.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Cancelled`] once cancellation has been
    /// requested.
    pub fn checkpoint(&self) -> Result<(), OperationError> {
        if self.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        Ok(())
    }
}
