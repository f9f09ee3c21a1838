//! Built-in site adapters
//!
//! Each supported site is a [`SiteProfile`] row: how to recognise its URLs,
//! which acquisition strategies to try, how strict the quality gate is and
//! where the article lives in the markup. One [`SiteAdapter`] type runs any
//! row through the shared [`StrategyExecutor`].

use crate::adapter::{Adapter, AdapterRegistry, FetchContext};
use crate::browser::BrowserStrategy;
use crate::cancel::Cancelled;
use crate::extract::{extract_article, strip_site_chrome};
use crate::http::HttpStrategy;
use crate::job::FetchResult;
use crate::render::MarkdownRenderer;
use crate::strategy::{QualityGate, RawPage, Strategy, StrategyExecutor};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Http,
    Browser,
}

impl StrategyKind {
    fn build(self) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Http => Box::new(HttpStrategy),
            StrategyKind::Browser => Box::new(BrowserStrategy),
        }
    }
}

#[derive(Debug)]
pub struct SiteProfile {
    pub name: &'static str,
    pub matcher: fn(&Url) -> bool,
    pub prefers_shared: bool,
    pub strategies: &'static [StrategyKind],
    pub gate: QualityGate,
    pub content_selectors: &'static [&'static str],
    pub title_selectors: &'static [&'static str],
}

const SITE_MIN_CHARS: usize = 200;
const GENERIC_MIN_CHARS: usize = 100;

const HTTP_THEN_BROWSER: &[StrategyKind] = &[StrategyKind::Http, StrategyKind::Browser];

const WEIXIN_BLOCKED: &[&str] = &["环境异常", "完成验证", "去验证"];
const ZHIHU_BLOCKED: &[&str] = &["验证", "登录", "访问被拒绝"];

/// Resolution order. First match wins.
pub static SITES: &[SiteProfile] = &[
    SiteProfile {
        name: "weixin",
        matcher: is_weixin,
        // Shared sessions trip WeChat's environment checks
        prefers_shared: false,
        strategies: &[StrategyKind::Browser],
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: true,
            blocked_markers: WEIXIN_BLOCKED,
        },
        content_selectors: &["div.rich_media_content", "div#js_content"],
        title_selectors: &["h1#activity-name", "h1.rich_media_title"],
    },
    SiteProfile {
        name: "zhihu",
        matcher: is_zhihu,
        prefers_shared: true,
        strategies: &[StrategyKind::Browser],
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: true,
            blocked_markers: ZHIHU_BLOCKED,
        },
        content_selectors: &["div.RichContent-inner", "div.Post-RichTextContainer"],
        title_selectors: &["h1.QuestionHeader-title", "h1.Post-Title"],
    },
    SiteProfile {
        name: "wordpress",
        matcher: is_wordpress,
        prefers_shared: true,
        strategies: HTTP_THEN_BROWSER,
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: false,
            blocked_markers: &[],
        },
        content_selectors: &["div.entry-content", "article .post-content"],
        title_selectors: &["h1.entry-title", "h1.post-title", "article h1"],
    },
    SiteProfile {
        name: "nextjs",
        matcher: is_nextjs,
        prefers_shared: true,
        strategies: HTTP_THEN_BROWSER,
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: false,
            blocked_markers: &[],
        },
        content_selectors: &["div.max-w-4xl.mx-auto.w-full.px-6", "main article"],
        title_selectors: &["main div.max-w-4xl div:first-child h1", "article h1"],
    },
    SiteProfile {
        name: "sspai",
        matcher: is_sspai,
        prefers_shared: true,
        strategies: HTTP_THEN_BROWSER,
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: false,
            blocked_markers: &[],
        },
        content_selectors: &[
            "article div.article-body div.article__main__content.wangEditor-txt",
            "div.article-body",
        ],
        title_selectors: &["div#article-title", "h1.entry-title", "article h1"],
    },
    SiteProfile {
        name: "appinn",
        matcher: is_appinn,
        prefers_shared: true,
        strategies: HTTP_THEN_BROWSER,
        gate: QualityGate {
            min_chars: SITE_MIN_CHARS,
            retry_short_content: false,
            blocked_markers: &[],
        },
        content_selectors: &["div.entry-content", "article .post-content"],
        title_selectors: &["h1.entry-title", "article h1"],
    },
];

/// Fallback for every URL no site row claims.
pub static GENERIC: SiteProfile = SiteProfile {
    name: "generic",
    matcher: |_| true,
    prefers_shared: true,
    strategies: HTTP_THEN_BROWSER,
    gate: QualityGate::new(GENERIC_MIN_CHARS),
    content_selectors: &[],
    title_selectors: &[],
};

fn host_is(url: &Url, domain: &str) -> bool {
    url.host_str().is_some_and(|host| {
        let host = host.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

fn path_starts(url: &Url, prefix: &str) -> bool {
    url.path().to_ascii_lowercase().starts_with(prefix)
}

fn is_weixin(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h.eq_ignore_ascii_case("mp.weixin.qq.com"))
}

fn is_zhihu(url: &Url) -> bool {
    host_is(url, "zhihu.com")
}

fn is_wordpress(url: &Url) -> bool {
    if host_is(url, "skywind.me") && path_starts(url, "/blog") {
        return true;
    }
    let lower = url.as_str().to_ascii_lowercase();
    ["wordpress.com", "wp-content", "/wp-", "wp-includes"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn is_nextjs(url: &Url) -> bool {
    host_is(url, "guangzhengli.com") && path_starts(url, "/blog")
}

fn is_sspai(url: &Url) -> bool {
    host_is(url, "sspai.com")
}

fn is_appinn(url: &Url) -> bool {
    host_is(url, "appinn.com")
}

/// Extract the article from `html` with `profile`'s selectors and render it.
pub fn digest_markup(
    profile: &SiteProfile,
    renderer: &dyn MarkdownRenderer,
    html: &str,
    title_hint: Option<String>,
    filter_site_chrome: bool,
) -> FetchResult {
    let extracted = extract_article(html, profile.content_selectors, profile.title_selectors);
    let content = if filter_site_chrome {
        strip_site_chrome(&extracted.content_html)
    } else {
        extracted.content_html
    };
    let body = renderer.to_markdown(&content);
    FetchResult::success(extracted.title.or(title_hint), body)
}

/// Runs one [`SiteProfile`] through the strategy executor.
pub struct SiteAdapter {
    profile: &'static SiteProfile,
    strategies: Vec<Box<dyn Strategy>>,
    executor: Arc<StrategyExecutor>,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl SiteAdapter {
    pub fn new(
        profile: &'static SiteProfile,
        executor: Arc<StrategyExecutor>,
        renderer: Arc<dyn MarkdownRenderer>,
    ) -> Self {
        Self {
            profile,
            strategies: profile.strategies.iter().map(|kind| kind.build()).collect(),
            executor,
            renderer,
        }
    }

    fn digest(&self, page: RawPage, filter_site_chrome: bool) -> FetchResult {
        digest_markup(
            self.profile,
            self.renderer.as_ref(),
            &page.html,
            page.title,
            filter_site_chrome,
        )
    }
}

#[async_trait]
impl Adapter for SiteAdapter {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    fn matches(&self, url: &Url) -> bool {
        (self.profile.matcher)(url)
    }

    fn prefers_shared_process(&self) -> bool {
        self.profile.prefers_shared
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FetchResult, Cancelled> {
        let gate = match ctx.options.min_chars {
            Some(min) => self.profile.gate.with_min_chars(min),
            None => self.profile.gate,
        };
        let filter = ctx.options.filter_site_chrome;
        let digest = |page: RawPage| self.digest(page, filter);
        self.executor
            .run(&self.strategies, &gate, ctx, &digest)
            .await
    }
}

/// Registry with every built-in site, falling back to the generic adapter.
pub fn builtin_registry(
    executor: Arc<StrategyExecutor>,
    renderer: Arc<dyn MarkdownRenderer>,
) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new(Box::new(SiteAdapter::new(
        &GENERIC,
        executor.clone(),
        renderer.clone(),
    )));
    for profile in SITES {
        registry.register(Box::new(SiteAdapter::new(
            profile,
            executor.clone(),
            renderer.clone(),
        )));
    }
    registry
}
