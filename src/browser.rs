//! Headless Chrome management via chromiumoxide

use crate::adapter::FetchContext;
use crate::cancel::{CancelToken, Cancelled};
use crate::config::{RenderOptions, DEFAULT_USER_AGENT};
use crate::error::FetchError;
use crate::strategy::{RawPage, Strategy};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound on closing a rendered page; the browser may have stopped answering.
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running headless browser that can render pages.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Navigate a fresh page to `url` and return its markup.
    async fn render(
        &self,
        url: &str,
        opts: &RenderOptions,
        cancel: &CancelToken,
    ) -> Result<RawPage, FetchError>;

    /// Terminate the browser process. Awaited until the process is gone.
    async fn close(&mut self) -> Result<(), FetchError>;
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, cancel: &CancelToken) -> Result<Box<dyn BrowserHandle>, FetchError>;
}

/// Launches a local Chrome/Chromium.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    user_agent: String,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl ChromeLauncher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, cancel: &CancelToken) -> Result<Box<dyn BrowserHandle>, FetchError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--headless=new")
            .build()
            .map_err(|e| FetchError::Browser(format!("browser config error: {}", e)))?;

        let (browser, mut handler) = cancel
            .run(Browser::launch(config))
            .await?
            .map_err(|e| {
                FetchError::Browser(format!(
                    "failed to launch Chrome ({}). Is Chrome/Chromium installed?",
                    e
                ))
            })?;

        // CDP event loop; must be polled for the browser to make progress
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::debug!("chrome launched");
        Ok(Box::new(ChromeBrowser {
            browser,
            handler,
            user_agent: self.user_agent.clone(),
        }))
    }
}

struct ChromeBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl ChromeBrowser {
    async fn render_page(
        &self,
        page: &Page,
        url: &str,
        opts: &RenderOptions,
        cancel: &CancelToken,
    ) -> Result<RawPage, FetchError> {
        cancel
            .run(page.execute(SetUserAgentOverrideParams::new(self.user_agent.as_str())))
            .await?
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        match cancel
            .run(tokio::time::timeout(opts.nav_timeout, page.goto(url)))
            .await?
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(parse_error(&e.to_string())),
            Err(_) => return Err(FetchError::Timeout),
        }

        cancel.sleep(opts.settle).await?;

        let title = read_optional(cancel, page.get_title()).await?;
        if let Some(status) = status_from_title(title.as_deref()) {
            return Err(FetchError::HttpStatus(status));
        }

        let html = cancel
            .run(page.content())
            .await?
            .map_err(|e| FetchError::Browser(format!("failed to get page content: {}", e)))?;
        let final_url = read_optional(cancel, page.url()).await?;

        Ok(RawPage {
            html,
            title,
            final_url,
        })
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn render(
        &self,
        url: &str,
        opts: &RenderOptions,
        cancel: &CancelToken,
    ) -> Result<RawPage, FetchError> {
        let page = cancel
            .run(self.browser.new_page("about:blank"))
            .await?
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let result = self.render_page(&page, url, opts, cancel).await;

        // Pages are never reused
        close_within(PAGE_CLOSE_TIMEOUT, page.close()).await;
        result
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Browser(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            tracing::warn!(error = %e, "waiting for chrome to exit failed");
        }
        self.handler.abort();
        tracing::debug!("chrome closed");
        closed
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Strategy: render the page in a headless browser.
///
/// Uses the batch's shared browser when one is lent; otherwise launches a
/// private browser for this attempt and always closes it again.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserStrategy;

#[async_trait]
impl Strategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn acquire(&self, ctx: &FetchContext<'_>) -> Result<RawPage, FetchError> {
        let opts = ctx.options.render;

        if let Some(shared) = ctx.shared_browser {
            return shared.render(ctx.url.as_str(), &opts, ctx.cancel).await;
        }

        ctx.detail("browser", "launching private browser".to_string());
        let mut browser = ctx.launcher.launch(ctx.cancel).await?;
        let result = browser.render(ctx.url.as_str(), &opts, ctx.cancel).await;
        if let Err(e) = browser.close().await {
            tracing::warn!(url = %ctx.url, error = %e, "closing private browser failed");
        }
        result
    }
}

/// A page property that may be missing; lookup errors count as missing.
async fn read_optional<F, E>(cancel: &CancelToken, read: F) -> Result<Option<String>, Cancelled>
where
    F: Future<Output = Result<Option<String>, E>>,
{
    Ok(cancel.run(read).await?.ok().flatten())
}

/// Returns whether `close` finished cleanly within `limit`.
async fn close_within<F, T, E>(limit: Duration, close: F) -> bool
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(limit, close).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "page close failed");
            false
        }
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "page close timed out");
            false
        }
    }
}

/// chromiumoxide doesn't expose the HTTP status; guess it from error-page titles.
fn status_from_title(title: Option<&str>) -> Option<u16> {
    let t = title?.trim().to_lowercase();
    if t == "404" || t.contains("404 not found") || t.contains("page not found") {
        return Some(404);
    }
    if t == "403" || t.contains("403 forbidden") || t.contains("access denied") {
        return Some(403);
    }
    if t == "500" || t.contains("internal server error") {
        return Some(500);
    }
    None
}

fn parse_error(error: &str) -> FetchError {
    if error.contains("ERR_NAME_NOT_RESOLVED") {
        FetchError::Network("DNS_FAILED".to_string())
    } else if error.contains("ERR_CONNECTION_REFUSED") {
        FetchError::Network("CONNECTION_REFUSED".to_string())
    } else if error.contains("ERR_CONNECTION_TIMED_OUT") || error.contains("ERR_TIMED_OUT") {
        FetchError::Timeout
    } else if error.contains("ERR_CERT") || error.contains("SSL") {
        FetchError::Network("SSL_ERROR".to_string())
    } else {
        FetchError::Browser(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, TestEnv};

    #[test]
    fn test_parse_error() {
        assert_eq!(
            parse_error("net::ERR_NAME_NOT_RESOLVED"),
            FetchError::Network("DNS_FAILED".to_string())
        );
        assert_eq!(
            parse_error("ERR_CONNECTION_REFUSED"),
            FetchError::Network("CONNECTION_REFUSED".to_string())
        );
        assert_eq!(parse_error("net::ERR_CONNECTION_TIMED_OUT"), FetchError::Timeout);
        assert!(matches!(parse_error("random error"), FetchError::Browser(_)));
    }

    #[test]
    fn test_status_from_title() {
        assert_eq!(status_from_title(Some("404 Not Found")), Some(404));
        assert_eq!(status_from_title(Some("Access Denied")), Some(403));
        assert_eq!(status_from_title(Some("500 Internal Server Error")), Some(500));
        assert_eq!(status_from_title(Some("Fixing 404 pages in Rust")), None);
        assert_eq!(status_from_title(None), None);
    }

    #[tokio::test]
    async fn test_read_optional_yields_to_stop() {
        let cancel = CancelToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.request_stop();
        });

        let started = std::time::Instant::now();
        let hung = std::future::pending::<Result<Option<String>, String>>();
        assert_eq!(read_optional(&cancel, hung).await, Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_read_optional_treats_errors_as_missing() {
        let cancel = CancelToken::new();
        let failed = async { Err::<Option<String>, _>("gone".to_string()) };
        assert_eq!(read_optional(&cancel, failed).await, Ok(None));
        let found = async { Ok::<_, String>(Some("Title".to_string())) };
        assert_eq!(read_optional(&cancel, found).await, Ok(Some("Title".to_string())));
    }

    #[tokio::test]
    async fn test_close_within_gives_up_on_hung_page() {
        let started = std::time::Instant::now();
        let hung = std::future::pending::<Result<(), String>>();
        assert!(!close_within(Duration::from_millis(50), hung).await);
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(close_within(Duration::from_millis(50), async { Ok::<_, String>(()) }).await);
        assert!(!close_within(Duration::from_millis(50), async { Err::<(), _>("x") }).await);
    }

    #[tokio::test]
    async fn test_private_browser_is_closed_after_attempt() {
        let launcher = FakeLauncher::new();
        let env = TestEnv::with_launcher(launcher.clone());
        let cancel = CancelToken::new();
        let ctx = env.context(&cancel);

        let page = BrowserStrategy.acquire(&ctx).await.unwrap();
        assert!(page.html.contains("rendered"));
        assert_eq!(launcher.opens(), 1);
        assert_eq!(launcher.closes(), 1);
        assert_eq!(launcher.live(), 0);
    }

    #[tokio::test]
    async fn test_private_browser_closed_even_when_render_fails() {
        let launcher = FakeLauncher::new().failing_render();
        let env = TestEnv::with_launcher(launcher.clone());
        let cancel = CancelToken::new();
        let ctx = env.context(&cancel);

        assert!(BrowserStrategy.acquire(&ctx).await.is_err());
        assert_eq!(launcher.live(), 0);
    }
}
