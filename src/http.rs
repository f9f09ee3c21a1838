//! Plain HTTP acquisition via reqwest

use crate::adapter::FetchContext;
use crate::cancel::CancelToken;
use crate::config::HttpSettings;
use crate::decode::decode_html;
use crate::error::FetchError;
use crate::extract::page_title;
use crate::strategy::{RawPage, Strategy};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Shared HTTP client with the run's timeouts and limits.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .danger_accept_invalid_certs(settings.accept_invalid_certs);
        if !settings.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// GET an HTML page. Non-HTML content types are rejected.
    pub async fn get_html(&self, url: &str, cancel: &CancelToken) -> Result<RawPage, FetchError> {
        let (bytes, final_url, content_type) = self.get(url, cancel).await?;

        if let Some(ct) = content_type.as_deref() {
            let essence = ct.split(';').next().unwrap_or(ct).trim();
            if !HTML_TYPES.iter().any(|t| t.eq_ignore_ascii_case(essence)) {
                return Err(FetchError::UnsupportedContent(essence.to_string()));
            }
        }

        let html = decode_html(&bytes, content_type.as_deref());
        let title = page_title(&html);
        Ok(RawPage {
            html,
            title,
            final_url: Some(final_url),
        })
    }

    /// GET raw bytes (images).
    pub async fn get_bytes(&self, url: &str, cancel: &CancelToken) -> Result<Vec<u8>, FetchError> {
        self.get(url, cancel).await.map(|(bytes, _, _)| bytes)
    }

    async fn get(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<(Vec<u8>, String, Option<String>), FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut response = cancel
            .run(self.client.get(parsed).send())
            .await?
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let max_bytes = self.settings.max_bytes;
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchError::TooLarge { max_bytes });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = cancel.run(response.chunk()).await?.map_err(map_reqwest_error)? {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge { max_bytes });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok((bytes, final_url, content_type))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::HttpStatus(status.as_u16())
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Strategy: fetch the page without a browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpStrategy;

#[async_trait]
impl Strategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn acquire(&self, ctx: &FetchContext<'_>) -> Result<RawPage, FetchError> {
        ctx.http.get_html(ctx.url.as_str(), ctx.cancel).await
    }
}
