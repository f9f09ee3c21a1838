//! Image download and link rewriting for converted Markdown

use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::http::HttpFetcher;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use url::Url;

/// Post-processes image references in a finished Markdown document.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Returns the rewritten Markdown.
    async fn process(
        &self,
        markdown: &str,
        base_url: &Url,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<String, FetchError>;
}

/// Leaves image links untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

#[async_trait]
impl ImagePipeline for NoImages {
    async fn process(
        &self,
        markdown: &str,
        _base_url: &Url,
        _out_dir: &Path,
        _cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        Ok(markdown.to_string())
    }
}

/// Downloads images into `<out_dir>/img/` and points the links at the local copies.
///
/// A single image that fails to download keeps its remote link.
pub struct ImageDownloader {
    http: Arc<HttpFetcher>,
}

impl ImageDownloader {
    pub const DIR: &'static str = "img";

    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImagePipeline for ImageDownloader {
    async fn process(
        &self,
        markdown: &str,
        base_url: &Url,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<String, FetchError> {
        let links = image_links(markdown);
        if links.is_empty() {
            return Ok(markdown.to_string());
        }

        let img_dir = out_dir.join(Self::DIR);
        tokio::fs::create_dir_all(&img_dir).await?;

        let mut local: HashMap<String, String> = HashMap::new();
        for (n, link) in links.iter().enumerate() {
            cancel.checkpoint()?;
            let Ok(absolute) = base_url.join(link) else {
                tracing::debug!(link = %link, "skipping unresolvable image link");
                continue;
            };
            if !matches!(absolute.scheme(), "http" | "https") {
                continue;
            }

            match self.http.get_bytes(absolute.as_str(), cancel).await {
                Ok(bytes) => {
                    let name = format!("{:03}{}", n + 1, image_extension(&absolute));
                    tokio::fs::write(img_dir.join(&name), &bytes).await?;
                    local.insert(link.clone(), format!("{}/{}", Self::DIR, name));
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(url = %absolute, error = %e, "image download failed");
                }
            }
        }

        tracing::info!(found = links.len(), saved = local.len(), "images processed");
        Ok(rewrite_links(markdown, &local))
    }
}

static IMAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

/// Unique image targets in document order.
fn image_links(markdown: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for caps in IMAGE_LINK.captures_iter(markdown) {
        let link = caps[2].to_string();
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

fn rewrite_links(markdown: &str, local: &HashMap<String, String>) -> String {
    IMAGE_LINK
        .replace_all(markdown, |caps: &regex::Captures| match local.get(&caps[2]) {
            Some(path) => format!("![{}]({})", &caps[1], path),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn image_extension(url: &Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    for ext in [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"] {
        if path.ends_with(ext) {
            return ext;
        }
    }
    if let Some(fmt) = url
        .query_pairs()
        .find(|(k, _)| k == "wx_fmt" || k == "format")
        .map(|(_, v)| v.to_ascii_lowercase())
    {
        match fmt.as_str() {
            "png" => return ".png",
            "gif" => return ".gif",
            "webp" => return ".webp",
            "jpeg" | "jpg" => return ".jpg",
            _ => {}
        }
    }
    ".jpg"
}
