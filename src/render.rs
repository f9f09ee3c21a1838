//! HTML to Markdown rendering

use regex::Regex;
use std::sync::LazyLock;

pub trait MarkdownRenderer: Send + Sync {
    fn to_markdown(&self, html: &str) -> String;
}

/// Renders with `html2text`, keeping images as Markdown image links.
#[derive(Debug, Clone, Copy)]
pub struct Html2TextRenderer {
    width: usize,
}

impl Default for Html2TextRenderer {
    fn default() -> Self {
        Self { width: 120 }
    }
}

impl MarkdownRenderer for Html2TextRenderer {
    fn to_markdown(&self, html: &str) -> String {
        let (html, images) = inline_images(html);
        let text = match html2text::from_read(html.as_bytes(), self.width) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "html2text failed");
                return String::new();
            }
        };

        let mut out = String::with_capacity(text.len());
        let mut blank = 0;
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                blank += 1;
                if blank > 1 {
                    continue;
                }
            } else {
                blank = 0;
            }
            out.push_str(line);
            out.push('\n');
        }
        restore_images(out.trim(), &images)
    }
}

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());

static IMG_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b(data-src|data-original|src|alt)\s*=\s*("([^"]*)"|'([^']*)')"#).unwrap()
});

static IMG_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mdfetchimg(\d+)x").unwrap());

/// Swap `<img>` tags for placeholder paragraphs and collect their Markdown.
///
/// html2text drops image URLs and wraps long lines, so the `![alt](src)`
/// links are put back only after rendering. Lazy-loading attributes
/// (`data-src`, `data-original`) win over `src`.
fn inline_images(html: &str) -> (String, Vec<String>) {
    let mut images = Vec::new();
    let replaced = IMG_TAG.replace_all(html, |caps: &regex::Captures| {
        let tag = &caps[0];
        let mut src = None;
        let mut lazy = None;
        let mut alt = "";
        for a in IMG_ATTR.captures_iter(tag) {
            let value = a.get(3).or_else(|| a.get(4)).map_or("", |m| m.as_str());
            match a[1].to_ascii_lowercase().as_str() {
                "data-src" | "data-original" => lazy = lazy.or(Some(value)),
                "src" => src = Some(value),
                _ => alt = value,
            }
        }
        match lazy.or(src).filter(|s| !s.is_empty() && !s.starts_with("data:")) {
            Some(url) => {
                let placeholder = format!("<p>mdfetchimg{}x</p>", images.len());
                images.push(format!("![{}]({})", alt.trim(), url.trim()));
                placeholder
            }
            None => String::new(),
        }
    });
    (replaced.into_owned(), images)
}

fn restore_images(text: &str, images: &[String]) -> String {
    if images.is_empty() {
        return text.to_string();
    }
    IMG_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| images.get(n))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
