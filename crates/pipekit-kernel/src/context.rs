//! Execution context shared by every stage of one pipeline run.
//!
//! ```text
//!   caller ctx ──child()──▶ run ctx ──child()──▶ nested pipeline ctx
//!       │                     │                        │
//!   cancel()/deadline     stage failure           stage failure
//!       └──────── cancellation flows down, never up ────┘
//! ```
//!
//! The context is read-only for stages. Only the top-level caller (explicit
//! cancel or deadline) and the runner (first fatal stage error) trigger it.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a run was cancelled. Only the first trigger is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the context.
    Requested,
    /// The context's deadline elapsed.
    DeadlineExceeded,
    /// A stage returned a fatal error and its siblings were stopped.
    StageFailed { stage: String },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancelled by request"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            CancelReason::StageFailed { stage } => write!(f, "stage '{}' failed", stage),
        }
    }
}

struct ContextInner {
    token: CancellationToken,
    deadline: Option<Instant>,
    reason: OnceLock<CancelReason>,
    parent: Option<Arc<ContextInner>>,
}

/// Cancellation signal and deadline for one pipeline run.
///
/// Cheap to clone; clones share the same signal.
#[derive(Clone)]
pub struct ExecContext {
    inner: Arc<ContextInner>,
}

impl ExecContext {
    /// Create a context with no deadline.
    pub fn new() -> Self {
        Self::build(CancellationToken::new(), None, None)
    }

    /// Create a context that cancels itself once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Create a context that cancels itself at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(CancellationToken::new(), Some(deadline), None)
    }

    fn build(token: CancellationToken, deadline: Option<Instant>, parent: Option<Arc<ContextInner>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                token,
                deadline,
                reason: OnceLock::new(),
                parent,
            }),
        }
    }

    /// Derive a child context.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent running. The child inherits the parent's deadline.
    pub fn child(&self) -> Self {
        Self::build(
            self.inner.token.child_token(),
            self.inner.deadline,
            Some(self.inner.clone()),
        )
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self::build(self.inner.token.child_token(), Some(deadline), Some(self.inner.clone()))
    }

    /// Cancel the context on behalf of the caller.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Requested);
    }

    /// Cancel with an explicit reason.
    ///
    /// Returns true if this call was the one that cancelled the context.
    /// Later calls (and calls after a parent cancelled us) change nothing.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        if self.inner.token.is_cancelled() {
            return false;
        }
        let first = self.inner.reason.set(reason).is_ok();
        self.inner.token.cancel();
        first
    }

    /// Whether cancellation has been triggered.
    ///
    /// A deadline that has passed but not yet been observed by anyone
    /// awaiting [`cancelled`](Self::cancelled) is reported here too.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.token.is_cancelled() {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel_with(CancelReason::DeadlineExceeded);
                true
            }
            _ => false,
        }
    }

    /// Wait until the context is cancelled or its deadline elapses.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {
                        self.cancel_with(CancelReason::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The first recorded cancellation reason, walking up to the ancestor
    /// that actually triggered it.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        let mut current = Some(&self.inner);
        while let Some(ctx) = current {
            if let Some(reason) = ctx.reason.get() {
                return Some(reason.clone());
            }
            current = ctx.parent.as_ref();
        }
        None
    }

    /// The underlying token, for integrating with other cancellation-aware code.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("cancelled", &self.inner.token.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .field("reason", &self.inner.reason.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let ctx = ExecContext::new();
        assert!(ctx.cancel_with(CancelReason::StageFailed { stage: "b".into() }));
        assert!(!ctx.cancel_with(CancelReason::StageFailed { stage: "c".into() }));
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(
            ctx.cancel_reason(),
            Some(CancelReason::StageFailed { stage: "b".into() })
        );
    }

    #[test]
    fn test_child_sees_parent_cancel() {
        let parent = ExecContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert_eq!(child.cancel_reason(), Some(CancelReason::Requested));
        // Too late for the child to claim its own reason.
        assert!(!child.cancel_with(CancelReason::DeadlineExceeded));
        assert_eq!(child.cancel_reason(), Some(CancelReason::Requested));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = ExecContext::new();
        let child = parent.child();
        child.cancel_with(CancelReason::StageFailed { stage: "x".into() });
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert_eq!(parent.cancel_reason(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_cancelled());
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_timeout_never_extends_parent_deadline() {
        let parent = ExecContext::with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        assert!(child.remaining().unwrap() <= Duration::from_millis(10));
    }
}
