//! Cancellation checkpoints for stage authors.
//!
//! Stateless helpers; the only state involved is the [`ExecContext`] passed in.
//! Connector reads and writes already check cancellation, so these are for
//! the other suspension points: timers, foreign futures and long loops.

use std::future::Future;
use std::time::Duration;

use crate::context::ExecContext;
use crate::error::{StageError, StageResult};

/// Return `Err(Cancelled)` if the context has been cancelled.
///
/// Call this once per unit of work in CPU-bound loops.
pub fn check(ctx: &ExecContext) -> StageResult {
    if ctx.is_cancelled() {
        Err(StageError::Cancelled)
    } else {
        Ok(())
    }
}

/// Sleep for `duration`, waking early with `Err(Cancelled)` on cancellation.
pub async fn sleep(ctx: &ExecContext, duration: Duration) -> StageResult {
    race(ctx, tokio::time::sleep(duration)).await
}

/// Drive `fut` to completion unless the context is cancelled first.
///
/// Cancellation wins when both are ready.
pub async fn race<F: Future>(ctx: &ExecContext, fut: F) -> StageResult<F::Output> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StageError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        let ctx = ExecContext::new();
        assert!(check(&ctx).is_ok());
        ctx.cancel();
        assert!(matches!(check(&ctx), Err(StageError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_cancel() {
        let ctx = ExecContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let result = sleep(&ctx, Duration::from_secs(3600)).await;
        assert!(matches!(result, Err(StageError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_stops_at_deadline() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(20));
        let result = sleep(&ctx, Duration::from_secs(3600)).await;
        assert!(matches!(result, Err(StageError::Cancelled)));
    }

    #[tokio::test]
    async fn test_race_returns_output() {
        let ctx = ExecContext::new();
        let value = race(&ctx, async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
