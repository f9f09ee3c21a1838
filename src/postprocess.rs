//! Markdown clean-up, output naming and writing

use chrono::{DateTime, Local};
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use url::Url;

/// Filename stem length in characters, before the timestamp prefix.
const MAX_STEM_CHARS: usize = 80;

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());
static BOLD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*{2,}\s*[^*].*?\s*\*{2,}\s*$").unwrap());
static BOLD_INNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*+\s*(.*?)\s*\*+\s*$").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Tidy headings in rendered Markdown.
///
/// - emphasis wrapped around a heading's text is removed;
/// - a line that is only `**bold**` becomes a `##` heading;
/// - the first line becomes the `#` title when it matches `title`
///   (or, without a title, when it is at least 4 characters);
/// - every heading is followed by a blank line.
pub fn normalize_headings(text: &str, title: Option<&str>) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let mut lines: Vec<String> = text
        .lines()
        .map(|line| {
            if let Some(caps) = HEADING.captures(line) {
                format!("{} {}", &caps[1], strip_emphasis(&caps[2]))
            } else if BOLD_LINE.is_match(line) {
                let inner = BOLD_INNER
                    .captures(line)
                    .map(|c| c[1].trim().to_string())
                    .unwrap_or_default();
                format!("## {}", inner)
            } else {
                line.to_string()
            }
        })
        .collect();

    if let Some(first) = lines.iter_mut().find(|l| !l.trim().is_empty()) {
        if !HEADING.is_match(first) {
            let candidate = strip_emphasis(first);
            let promote = match title.map(str::trim).filter(|t| !t.is_empty()) {
                Some(title) => {
                    let t = collapse_ws(title);
                    let c = collapse_ws(&candidate);
                    c == t || (c.chars().count() >= 4 && t.to_lowercase().starts_with(&c.to_lowercase()))
                }
                None => candidate.chars().count() >= 4,
            };
            if promote {
                *first = format!("# {}", candidate);
            }
        }
    }

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 8);
    for (i, line) in lines.iter().enumerate() {
        out.push(line);
        let next_has_text = lines.get(i + 1).is_some_and(|n| !n.trim().is_empty());
        if HEADING.is_match(line) && next_has_text {
            out.push("");
        }
    }

    let joined = out.join("\n");
    let collapsed = BLANK_RUN.replace_all(&joined, "\n\n");
    format!("{}\n", collapsed.trim())
}

fn strip_emphasis(s: &str) -> String {
    let mut s = s.trim();
    if s.len() > 4 && s.starts_with("**") && s.ends_with("**") {
        s = &s[2..s.len() - 2];
    }
    if s.len() > 2 && s.starts_with('*') && s.ends_with('*') {
        s = &s[1..s.len() - 1];
    }
    s.trim().to_string()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace characters that are invalid in file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `YYYYMMDD_HHMMSS_<title>.md`, falling back to the URL's last path
/// segment, its host, or `page`.
pub fn derive_filename(title: Option<&str>, source: &str, now: DateTime<Local>) -> String {
    let base = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => stem_from_source(source),
    };
    format!("{}_{}.md", now.format("%Y%m%d_%H%M%S"), sanitize_filename(&base))
}

fn stem_from_source(source: &str) -> String {
    if let Ok(url) = Url::parse(source) {
        let last = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty());
        return last
            .or(url.host_str())
            .unwrap_or("page")
            .to_string();
    }
    Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("page")
        .to_string()
}

/// Write `content` to `dir/filename`, creating `dir` as needed.
///
/// An existing file is never overwritten; `_1`, `_2`... is appended instead.
pub async fn write_markdown(dir: &Path, filename: &str, content: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir).await?;

    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("md");

    let mut candidate = dir.join(filename);
    let mut n = 1;
    while fs::try_exists(&candidate).await? {
        candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        n += 1;
    }

    fs::write(&candidate, content).await?;
    Ok(candidate)
}
