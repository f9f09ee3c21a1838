//! Acquisition strategies and the retry/fallback executor
//!
//! An adapter hands the executor an ordered list of strategies (plain HTTP,
//! headless browser), a quality gate and a digest step turning raw markup
//! into a [`FetchResult`]. The executor owns every retry, backoff and pause.

use crate::adapter::FetchContext;
use crate::cancel::Cancelled;
use crate::config::FetchPolicy;
use crate::error::FetchError;
use crate::job::FetchResult;
use async_trait::async_trait;

/// Markup produced by one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub html: String,
    pub title: Option<String>,
    pub final_url: Option<String>,
}

/// One way of getting a page's markup.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-strategy attempt budget; `None` uses the policy's.
    fn max_attempts(&self) -> Option<u32> {
        None
    }

    async fn acquire(&self, ctx: &FetchContext<'_>) -> Result<RawPage, FetchError>;
}

/// Bodies at least this long are trusted even if they mention a blocked marker.
pub const TRUSTED_LEN: usize = 1000;

/// Minimum quality a digested page must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    pub min_chars: usize,
    /// Short content consumes an attempt of the same strategy instead of
    /// moving straight to the next one.
    pub retry_short_content: bool,
    pub blocked_markers: &'static [&'static str],
}

impl QualityGate {
    pub const fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            retry_short_content: true,
            blocked_markers: &[],
        }
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn check(&self, result: &FetchResult) -> Result<(), FetchError> {
        if !result.is_success() {
            return Err(FetchError::TooShort {
                chars: 0,
                min: self.min_chars,
            });
        }

        let body = result.body();
        let chars = body.chars().count();

        if chars < TRUSTED_LEN {
            if let Some(marker) = self.blocked_markers.iter().find(|m| body.contains(*m)) {
                return Err(FetchError::Blocked((*marker).to_string()));
            }
        }

        if chars < self.min_chars {
            return Err(FetchError::TooShort {
                chars,
                min: self.min_chars,
            });
        }

        Ok(())
    }
}

/// Turns acquired markup into a result (extraction + rendering).
pub type Digest<'d> = &'d (dyn Fn(RawPage) -> FetchResult + Send + Sync);

/// Runs strategies in order with bounded, jittered retries.
#[derive(Debug, Clone, Default)]
pub struct StrategyExecutor {
    policy: FetchPolicy,
}

impl StrategyExecutor {
    pub fn new(policy: FetchPolicy) -> Self {
        Self { policy }
    }

    /// Returns the first result that passes `gate`, or a failure carrying the
    /// last error and the attempt count once every strategy is exhausted.
    pub async fn run(
        &self,
        strategies: &[Box<dyn Strategy>],
        gate: &QualityGate,
        ctx: &FetchContext<'_>,
        digest: Digest<'_>,
    ) -> Result<FetchResult, Cancelled> {
        let mut last_error: Option<FetchError> = None;
        let mut attempts = 0u32;

        for (index, strategy) in strategies.iter().enumerate() {
            let name = strategy.name();
            if index > 0 {
                ctx.detail("strategy", format!("falling back to {}", name));
                ctx.cancel.sleep(self.policy.strategy_pause.sample()).await?;
            }

            let max = strategy
                .max_attempts()
                .unwrap_or(self.policy.max_attempts)
                .max(1);

            for attempt in 1..=max {
                ctx.cancel.checkpoint()?;
                if attempt > 1 {
                    ctx.detail("retry", format!("{} attempt {}/{}", name, attempt, max));
                    ctx.cancel.sleep(self.policy.retry_backoff.sample()).await?;
                }
                attempts += 1;

                let err = match strategy.acquire(ctx).await {
                    Ok(page) => {
                        let final_url = page.final_url.clone();
                        let result = digest(page).with_final_url(final_url);
                        match gate.check(&result) {
                            Ok(()) => {
                                tracing::info!(
                                    url = %ctx.url,
                                    strategy = name,
                                    attempt,
                                    chars = result.body().chars().count(),
                                    "acquired"
                                );
                                return Ok(result);
                            }
                            Err(e) => e,
                        }
                    }
                    Err(e) if e.is_cancelled() => return Err(Cancelled),
                    Err(e) => e,
                };

                tracing::warn!(
                    url = %ctx.url,
                    strategy = name,
                    attempt,
                    max,
                    error = %err,
                    "attempt failed"
                );

                let skip_rest = err.is_quality_failure() && !gate.retry_short_content;
                last_error = Some(err);
                if skip_rest {
                    break;
                }
            }
        }

        let reason = match last_error {
            Some(e) => format!("{} after {} attempts", e, attempts),
            None => "no acquisition strategy".to_string(),
        };
        tracing::warn!(url = %ctx.url, attempts, "all strategies exhausted");
        Ok(FetchResult::failure(reason))
    }
}
