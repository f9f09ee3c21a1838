//! Content extraction from HTML and text

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Containers tried when no site-specific selector matches.
const FALLBACK_CONTENT: &[&str] = &["article", "main", "body"];

/// Elements that are page furniture rather than article content.
const SITE_CHROME: &[&str] = &[
    "script",
    "style",
    "noscript",
    "iframe",
    "nav",
    "header",
    "footer",
    "aside",
    "form",
    "[role='navigation']",
    "[role='banner']",
    "[role='complementary']",
    ".advertisement",
    ".ads",
    ".share",
    ".comments",
    "#comments",
    ".related",
    ".sidebar",
];

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s\)>\]"'`]+"#).unwrap());

/// Extract unique URLs from text content
pub fn extract_urls(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for mat in URL.find_iter(content) {
        let url = mat.as_str();
        // Clean trailing punctuation
        let url = url.trim_end_matches(|c| matches!(c, ',' | '.' | ')' | ']' | ';' | ':'));

        if !seen.contains(url) {
            seen.insert(url.to_string());
            urls.push(url.to_string());
        }
    }

    urls
}

/// Page title from `<title>`, `og:title` or the first `<h1>`.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    document_title(&doc)
}

fn document_title(doc: &Html) -> Option<String> {
    select_text(doc, "title")
        .or_else(|| select_attr(doc, "meta[property='og:title']", "content"))
        .or_else(|| select_text(doc, "h1"))
}

/// The article part of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    pub content_html: String,
}

/// Pick the article container and title.
///
/// Selectors are tried in order; content falls back to `article`, `main`,
/// `body` and finally the whole document. Title falls back to [`page_title`].
pub fn extract_article(html: &str, content_selectors: &[&str], title_selectors: &[&str]) -> Extracted {
    let doc = Html::parse_document(html);

    let title = title_selectors
        .iter()
        .find_map(|sel| select_text(&doc, sel))
        .or_else(|| document_title(&doc));

    let content_html = content_selectors
        .iter()
        .chain(FALLBACK_CONTENT)
        .find_map(|sel| select_html(&doc, sel))
        .unwrap_or_else(|| html.to_string());

    Extracted {
        title,
        content_html,
    }
}

/// Remove navigation, ads, comments and other non-article elements.
pub fn strip_site_chrome(html: &str) -> String {
    let mut doc = Html::parse_document(html);

    let mut doomed = Vec::new();
    for sel in SITE_CHROME {
        if let Ok(selector) = Selector::parse(sel) {
            doomed.extend(doc.select(&selector).map(|el| el.id()));
        }
    }

    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    doc.html()
}

fn select_text(doc: &Html, sel: &str) -> Option<String> {
    let selector = Selector::parse(sel).ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_attr(doc: &Html, sel: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(sel).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_html(doc: &Html, sel: &str) -> Option<String> {
    let selector = Selector::parse(sel).ok()?;
    doc.select(&selector)
        .next()
        .filter(|el| !el.text().collect::<String>().trim().is_empty())
        .map(|el| el.html())
}
