//! Run configuration: retry policy, HTTP settings and conversion options

use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A uniform random pause between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseWindow {
    pub min: Duration,
    pub max: Duration,
}

impl PauseWindow {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Retry and pause policy shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Attempts per strategy, unless a strategy overrides it.
    pub max_attempts: u32,
    /// Backoff before a retry of the same strategy.
    pub retry_backoff: PauseWindow,
    /// Pause before moving on to the next strategy.
    pub strategy_pause: PauseWindow,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_backoff: PauseWindow::new(Duration::from_secs(2), Duration::from_secs(4)),
            strategy_pause: PauseWindow::new(Duration::from_secs(1), Duration::from_secs(3)),
        }
    }
}

impl FetchPolicy {
    /// No pauses at all, for tests and local-only runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_backoff: PauseWindow::zero(),
            strategy_pause: PauseWindow::zero(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Largest accepted response body.
    pub max_bytes: u64,
    pub accept_invalid_certs: bool,
    /// Honour system proxy variables.
    pub use_proxy: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_bytes: 10 * 1024 * 1024,
            accept_invalid_certs: false,
            use_proxy: true,
        }
    }
}

/// Browser navigation settings for one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub nav_timeout: Duration,
    /// Wait after navigation so client-side scripts can fill the page.
    pub settle: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(2),
        }
    }
}

/// Everything a batch run needs to know.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub output_dir: PathBuf,
    pub download_images: bool,
    pub filter_site_chrome: bool,
    pub use_shared_browser: bool,
    /// Overrides the per-site minimum content length when set.
    pub min_chars: Option<usize>,
    pub render: RenderOptions,
    pub policy: FetchPolicy,
    pub http: HttpSettings,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            download_images: false,
            filter_site_chrome: false,
            use_shared_browser: true,
            min_chars: None,
            render: RenderOptions::default(),
            policy: FetchPolicy::default(),
            http: HttpSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.retry_backoff.min, Duration::from_secs(2));
        assert_eq!(policy.strategy_pause.max, Duration::from_secs(3));
    }

    #[test]
    fn test_pause_window_sample_in_range() {
        let window = PauseWindow::new(Duration::from_millis(100), Duration::from_millis(300));
        for _ in 0..50 {
            let d = window.sample();
            assert!(d >= window.min && d <= window.max);
        }
        assert_eq!(PauseWindow::zero().sample(), Duration::ZERO);
    }
}
