//! Test doubles: a fake browser launcher, scripted strategies and adapters

use crate::adapter::{Adapter, FetchContext};
use crate::browser::{BrowserHandle, BrowserLauncher};
use crate::cancel::{CancelToken, Cancelled};
use crate::config::{ConvertOptions, FetchPolicy, HttpSettings, RenderOptions};
use crate::error::FetchError;
use crate::extract::page_title;
use crate::http::HttpFetcher;
use crate::job::FetchResult;
use crate::strategy::{RawPage, Strategy};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

pub fn body_of(chars: usize) -> String {
    "x".repeat(chars)
}

/// Returns scripted outcomes in order, repeating the last one.
pub struct ScriptedStrategy {
    name: &'static str,
    script: Vec<Result<String, FetchError>>,
    max_attempts: Option<u32>,
    final_url: Option<String>,
    calls: Counter,
}

impl ScriptedStrategy {
    pub fn sequence(name: &'static str, script: Vec<Result<String, FetchError>>) -> Self {
        assert!(!script.is_empty());
        Self {
            name,
            script,
            max_attempts: None,
            final_url: None,
            calls: Counter::default(),
        }
    }

    pub fn always(name: &'static str, outcome: Result<String, FetchError>) -> Self {
        Self::sequence(name, vec![outcome])
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    /// Report pages as served from `url`, as after a redirect.
    pub fn landing_at(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn calls(&self) -> Counter {
        self.calls.clone()
    }
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    async fn acquire(&self, _ctx: &FetchContext<'_>) -> Result<RawPage, FetchError> {
        let n = self.calls.bump().min(self.script.len() - 1);
        self.script[n].clone().map(|html| RawPage {
            html,
            title: None,
            final_url: self.final_url.clone(),
        })
    }
}

const FAKE_HTML: &str = "<html><head><title>Fake page</title></head><body><article>\
    <h1>Fake page</h1><p>This page was rendered by a fake browser for tests. \
    It has enough text to pass the generic quality gate without trouble, \
    and then some more words so that site gates are satisfied as well. \
    Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
    tempor incididunt ut labore et dolore magna aliqua.</p></article></body></html>";

#[derive(Debug, Default)]
struct FakeState {
    attempts: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_launch: AtomicBool,
    fail_render: AtomicBool,
    html: Mutex<Option<String>>,
}

/// Launcher that hands out in-memory browsers and counts their lifecycle.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launch(self) -> Self {
        self.state.fail_launch.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_render(self) -> Self {
        self.state.fail_render.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_html(self, html: &str) -> Self {
        *self.state.html.lock().unwrap() = Some(html.to_string());
        self
    }

    /// Launch calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Browsers opened and not yet closed.
    pub fn live(&self) -> usize {
        self.opens().saturating_sub(self.closes())
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, cancel: &CancelToken) -> Result<Box<dyn BrowserHandle>, FetchError> {
        cancel.checkpoint()?;
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_launch.load(Ordering::SeqCst) {
            return Err(FetchError::Browser("chrome not found".to_string()));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct FakeBrowser {
    state: Arc<FakeState>,
    closed: bool,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn render(
        &self,
        url: &str,
        _opts: &RenderOptions,
        cancel: &CancelToken,
    ) -> Result<RawPage, FetchError> {
        cancel.checkpoint()?;
        if self.state.fail_render.load(Ordering::SeqCst) {
            return Err(FetchError::Browser("render failed".to_string()));
        }
        let html = self
            .state
            .html
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| FAKE_HTML.to_string());
        Ok(RawPage {
            title: page_title(&html),
            html,
            final_url: Some(url.to_string()),
        })
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Owns everything a [`FetchContext`] borrows.
pub struct TestEnv {
    pub launcher: FakeLauncher,
    pub http: HttpFetcher,
    pub options: ConvertOptions,
    url: Url,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_launcher(FakeLauncher::new())
    }

    pub fn with_launcher(launcher: FakeLauncher) -> Self {
        Self {
            launcher,
            http: HttpFetcher::new(HttpSettings::default()).unwrap(),
            options: ConvertOptions {
                policy: FetchPolicy::immediate(2),
                render: RenderOptions {
                    nav_timeout: Duration::from_secs(1),
                    settle: Duration::ZERO,
                },
                ..ConvertOptions::default()
            },
            url: Url::parse("https://example.com/post").unwrap(),
        }
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn context<'a>(&'a self, cancel: &'a CancelToken) -> FetchContext<'a> {
        self.context_for(&self.url, cancel)
    }

    pub fn context_for<'a>(&'a self, url: &'a Url, cancel: &'a CancelToken) -> FetchContext<'a> {
        FetchContext::new(url, &self.launcher, &self.http, cancel, &self.options)
    }
}

#[derive(Debug, Clone)]
struct SeenCall {
    url: String,
    shared: bool,
    live: usize,
}

/// What a [`StaticAdapter`] observed on each call.
#[derive(Debug, Clone, Default)]
pub struct Seen(Arc<Mutex<Vec<SeenCall>>>);

impl Seen {
    pub fn urls(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|c| c.url.clone()).collect()
    }

    pub fn shared_flags(&self) -> Vec<bool> {
        self.0.lock().unwrap().iter().map(|c| c.shared).collect()
    }

    /// Live browser count at the moment each fetch ran.
    pub fn live_during(&self) -> Vec<usize> {
        self.0.lock().unwrap().iter().map(|c| c.live).collect()
    }
}

/// Adapter with canned results keyed off the URL path:
/// `fail` yields a failed result, `panic` panics, anything else succeeds.
pub struct StaticAdapter {
    name: &'static str,
    host_suffix: &'static str,
    shared: bool,
    seen: Seen,
    watched: Option<FakeLauncher>,
}

impl StaticAdapter {
    pub fn new(name: &'static str, host_suffix: &'static str, shared: bool) -> Self {
        Self {
            name,
            host_suffix,
            shared,
            seen: Seen::default(),
            watched: None,
        }
    }

    pub fn recording(mut self, seen: Seen) -> Self {
        self.seen = seen;
        self
    }

    pub fn watching(mut self, launcher: FakeLauncher) -> Self {
        self.watched = Some(launcher);
        self
    }
}

#[async_trait]
impl Adapter for StaticAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, url: &Url) -> bool {
        !self.host_suffix.is_empty()
            && url
                .host_str()
                .is_some_and(|host| host.ends_with(self.host_suffix))
    }

    fn prefers_shared_process(&self) -> bool {
        self.shared
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FetchResult, Cancelled> {
        ctx.cancel.checkpoint()?;
        let call = SeenCall {
            url: ctx.url.to_string(),
            shared: ctx.shared_browser.is_some(),
            live: self.watched.as_ref().map_or(0, FakeLauncher::live),
        };
        self.seen.0.lock().unwrap().push(call);

        let path = ctx.url.path();
        if path.contains("panic") {
            panic!("scripted panic for {}", ctx.url);
        }
        if path.contains("fail") {
            return Ok(FetchResult::failure("scripted failure"));
        }
        Ok(FetchResult::success(
            Some(format!("{} page", self.name)),
            format!("Body of {}\n\n{}", ctx.url, "text ".repeat(40)),
        ))
    }
}
