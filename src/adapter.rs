//! Content adapters and the registry that dispatches URLs to them

use crate::browser::{BrowserHandle, BrowserLauncher};
use crate::cancel::{CancelToken, Cancelled};
use crate::config::ConvertOptions;
use crate::http::HttpFetcher;
use crate::job::FetchResult;
use async_trait::async_trait;
use url::Url;

/// Everything an adapter may use while fetching one URL.
pub struct FetchContext<'a> {
    pub url: &'a Url,
    /// 1-based position of the job in its batch.
    pub job_index: usize,
    /// The batch's shared browser, lent for this job only.
    pub shared_browser: Option<&'a dyn BrowserHandle>,
    /// Used when no shared browser is lent.
    pub launcher: &'a dyn BrowserLauncher,
    pub http: &'a HttpFetcher,
    pub cancel: &'a CancelToken,
    pub options: &'a ConvertOptions,
    detail: &'a (dyn Fn(&str, String) + Send + Sync),
}

fn ignore_detail(_: &str, _: String) {}

impl<'a> FetchContext<'a> {
    pub fn new(
        url: &'a Url,
        launcher: &'a dyn BrowserLauncher,
        http: &'a HttpFetcher,
        cancel: &'a CancelToken,
        options: &'a ConvertOptions,
    ) -> Self {
        Self {
            url,
            job_index: 1,
            shared_browser: None,
            launcher,
            http,
            cancel,
            options,
            detail: &ignore_detail,
        }
    }

    pub fn with_job_index(mut self, job_index: usize) -> Self {
        self.job_index = job_index;
        self
    }

    pub fn with_shared_browser(mut self, browser: Option<&'a dyn BrowserHandle>) -> Self {
        self.shared_browser = browser;
        self
    }

    /// Route `detail` notes (strategy switches, retries) to a progress sink.
    pub fn with_detail(mut self, detail: &'a (dyn Fn(&str, String) + Send + Sync)) -> Self {
        self.detail = detail;
        self
    }

    pub fn detail(&self, key: &str, message: String) {
        (self.detail)(key, message)
    }
}

/// A site-specific (or the generic) way of turning a URL into Markdown.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure check on the parsed URL; no I/O.
    fn matches(&self, url: &Url) -> bool;

    /// `false` means the adapter must not share a browser with other jobs.
    fn prefers_shared_process(&self) -> bool {
        true
    }

    /// Never reports cancellation as a failed result.
    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FetchResult, Cancelled>;
}

/// Ordered adapters plus the generic fallback. First match wins.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn Adapter>>,
    fallback: Box<dyn Adapter>,
}

impl AdapterRegistry {
    pub fn new(fallback: Box<dyn Adapter>) -> Self {
        Self {
            adapters: Vec::new(),
            fallback,
        }
    }

    pub fn register(&mut self, adapter: Box<dyn Adapter>) -> &mut Self {
        self.adapters.push(adapter);
        self
    }

    /// Always returns an adapter; unparseable or unknown URLs get the fallback.
    pub fn resolve(&self, url: &str) -> &dyn Adapter {
        match Url::parse(url.trim()) {
            Ok(parsed) => self.resolve_url(&parsed),
            Err(_) => self.fallback.as_ref(),
        }
    }

    pub fn resolve_url(&self, url: &Url) -> &dyn Adapter {
        self.adapters
            .iter()
            .find(|a| a.matches(url))
            .map(|a| a.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn prefers_shared_process(&self, url: &str) -> bool {
        self.resolve(url).prefers_shared_process()
    }

    /// Adapters in resolution order, fallback last.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Adapter> {
        self.adapters
            .iter()
            .map(|a| a.as_ref())
            .chain(std::iter::once(self.fallback.as_ref()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|a| a.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticAdapter;

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new(Box::new(StaticAdapter::new("generic", "", true)));
        registry
            .register(Box::new(StaticAdapter::new("first", "example.com", true)))
            .register(Box::new(StaticAdapter::new("second", "example.com", false)))
            .register(Box::new(StaticAdapter::new("other", "other.org", false)));
        registry
    }

    #[test]
    fn test_first_registered_wins() {
        let registry = registry();
        assert_eq!(registry.resolve("https://example.com/post/1").name(), "first");
        assert_eq!(registry.resolve("https://www.other.org/").name(), "other");
    }

    #[test]
    fn test_resolve_is_total() {
        let registry = registry();
        for url in ["https://unknown.net/", "not a url", "", "mailto:someone@example.net"] {
            assert_eq!(registry.resolve(url).name(), "generic", "{url}");
        }
    }

    #[test]
    fn test_prefers_shared_process() {
        let registry = registry();
        assert!(registry.prefers_shared_process("https://example.com/"));
        assert!(!registry.prefers_shared_process("https://other.org/a"));
        assert!(registry.prefers_shared_process("garbage"));
    }

    #[test]
    fn test_names_in_order() {
        assert_eq!(registry().names(), vec!["first", "second", "other", "generic"]);
    }
}
