//! Cooperative delays and polling waits
//!
//! Every wait observes the session cancellation token. Cancellation ends a
//! wait quietly with [`WaitOutcome::Cancelled`]; running out of time is an
//! error.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ConformError, Result};

/// How a wait ended without timing out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Settled,
    Cancelled,
}

/// Sleep for `duration` unless the session is cancelled first
pub async fn delay(cancel: &CancellationToken, duration: Duration) -> WaitOutcome {
    tokio::select! {
        _ = cancel.cancelled() => WaitOutcome::Cancelled,
        _ = tokio::time::sleep(duration) => WaitOutcome::Settled,
    }
}

/// Poll `busy` every `interval` until it returns false.
///
/// The deadline is `timeout` plus two poll intervals so the final check is
/// not raced by the clock.
pub async fn wait_while<F, Fut>(
    cancel: &CancellationToken,
    interval: Duration,
    timeout: Duration,
    description: &str,
    mut busy: F,
) -> Result<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout + interval * 2;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Wait for {} cancelled", description);
            return Ok(WaitOutcome::Cancelled);
        }
        if !busy().await {
            return Ok(WaitOutcome::Settled);
        }
        if Instant::now() >= deadline {
            return Err(ConformError::Timeout(format!(
                "{} did not complete within {:?}",
                description, timeout
            )));
        }
        if delay(cancel, interval).await == WaitOutcome::Cancelled {
            tracing::debug!("Wait for {} cancelled", description);
            return Ok(WaitOutcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn settles_when_predicate_clears() {
        let cancel = CancellationToken::new();
        let counter = AtomicU32::new(0);
        let polls = &counter;

        let outcome = wait_while(
            &cancel,
            Duration::from_millis(5),
            Duration::from_secs(5),
            "slew",
            move || async move { polls.fetch_add(1, Ordering::SeqCst) < 3 },
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Settled);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn times_out_with_distinct_error() {
        let cancel = CancellationToken::new();
        let err = wait_while(
            &cancel,
            Duration::from_millis(5),
            Duration::from_millis(20),
            "shutter",
            || async { true },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConformError::Timeout(_)));
        assert!(err.to_string().contains("shutter did not complete"));
    }

    #[tokio::test]
    async fn cancellation_exits_quietly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = wait_while(
            &cancel,
            Duration::from_millis(5),
            Duration::from_secs(60),
            "park",
            || async { true },
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn delay_returns_early_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        assert_eq!(
            delay(&cancel, Duration::from_secs(30)).await,
            WaitOutcome::Cancelled
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
