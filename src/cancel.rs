//! Cooperative cancellation for batch runs
//!
//! Every wait that can block (HTTP request, browser launch or navigation,
//! retry backoff) goes through [`CancelToken`] so a stop request is
//! observed within one [`CancelToken::SLICE`].

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The single stop signal. Returned by every checkpoint once a stop was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stop requested")]
pub struct Cancelled;

/// Shared "stop requested" flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Longest uninterrupted wait between two checkpoints.
    pub const SLICE: Duration = Duration::from_millis(200);

    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent, callable from any thread.
    pub fn request_stop(&self) {
        self.inner.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns `Err(Cancelled)` if a stop was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_stop_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` in slices, checking for a stop between slices.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.checkpoint()?;
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(Self::SLICE);
            tokio::time::sleep(step).await;
            remaining -= step;
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Drive `fut` to completion, checking for a stop every slice.
    ///
    /// The future is dropped (and so aborted) when a stop is observed.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        tokio::pin!(fut);
        loop {
            self.checkpoint()?;
            if let Ok(output) = tokio::time::timeout(Self::SLICE, &mut fut).await {
                return Ok(output);
            }
        }
    }
}
