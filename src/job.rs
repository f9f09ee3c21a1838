//! Jobs, fetch results and per-job artifacts

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub type JobId = u64;

/// What a job's `value` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// An http(s) URL to fetch
    Url,
    /// Inline HTML markup
    Html,
    /// Path to a local HTML file
    File,
}

/// One unit of work in a batch. Not modified once the batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub value: String,
    pub metadata: BTreeMap<String, String>,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind, value: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            value: value.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn url(id: JobId, url: impl Into<String>) -> Self {
        Self::new(id, JobKind::Url, url)
    }

    pub fn html(id: JobId, markup: impl Into<String>) -> Self {
        Self::new(id, JobKind::Html, markup)
    }

    pub fn file(id: JobId, path: impl Into<String>) -> Self {
        Self::new(id, JobKind::File, path)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build a job from one line of user input.
    ///
    /// Blank lines and `#` comments are skipped; http(s) URLs become URL
    /// jobs and `.html`/`.htm` paths become file jobs.
    pub fn parse_input(id: JobId, line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(Self::url(id, line));
        }
        if lower.ends_with(".html") || lower.ends_with(".htm") {
            return Some(Self::file(id, line));
        }
        None
    }

    /// Short human label: the URL or path, or a placeholder for inline HTML.
    pub fn label(&self) -> &str {
        match self.kind {
            JobKind::Html => self
                .metadata
                .get("label")
                .map(String::as_str)
                .unwrap_or("<inline html>"),
            JobKind::Url | JobKind::File => &self.value,
        }
    }
}

/// Outcome of one acquisition (after extraction and rendering).
///
/// Either a success with a non-empty body or a failure carrying an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    title: Option<String>,
    body: String,
    success: bool,
    error: Option<String>,
    final_url: Option<String>,
}

impl FetchResult {
    /// An empty body is not a success; it is turned into a failure.
    pub fn success(title: Option<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        if body.trim().is_empty() {
            return Self::failure("empty content");
        }
        Self {
            title: title.filter(|t| !t.trim().is_empty()),
            body,
            success: true,
            error: None,
            final_url: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            title: None,
            body: String::new(),
            success: false,
            error: Some(error.into()),
            final_url: None,
        }
    }

    /// Where the page was actually served from, after redirects.
    pub fn with_final_url(mut self, final_url: Option<String>) -> Self {
        self.final_url = final_url;
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn final_url(&self) -> Option<&str> {
        self.final_url.as_deref()
    }
}

/// What a completed job produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub path: PathBuf,
    pub chars: usize,
}
