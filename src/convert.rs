//! convert command: fetch articles and write them as Markdown files
//!
//! Progress goes to stderr, the compact JSON (or YAML) summary to stdout.

use crate::batch::{BatchSummary, Orchestrator};
use crate::config::{ConvertOptions, FetchPolicy, HttpSettings, RenderOptions};
use crate::extract::extract_urls;
use crate::job::Job;
use crate::progress::{EventKind, ProgressEvent};
use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

#[derive(Args)]
pub struct ConvertArgs {
    /// File listing URLs (any text/markdown), or an HTML file to convert
    #[arg(value_name = "FILE")]
    file: Option<String>,

    /// URL to convert (repeatable)
    #[arg(long)]
    url: Vec<String>,

    /// Read URLs from stdin (one per line)
    #[arg(long)]
    stdin: bool,

    /// Convert local HTML files matching a glob pattern
    #[arg(long, value_name = "PATTERN")]
    files: Option<String>,

    /// Output directory for Markdown files
    #[arg(short, long, default_value = "output", env = "MDFETCH_OUTPUT")]
    output: PathBuf,

    /// Launch a separate browser per attempt instead of sharing one
    #[arg(long)]
    no_shared_browser: bool,

    /// Download images next to the Markdown and rewrite links
    #[arg(long)]
    download_images: bool,

    /// Drop navigation, ads, comments and other page furniture
    #[arg(long)]
    filter_site_chrome: bool,

    /// Timeout per request/navigation in milliseconds
    #[arg(long, default_value = "30000", env = "MDFETCH_TIMEOUT")]
    timeout: u64,

    /// Attempts per acquisition strategy (1-5)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..=5))]
    retries: u32,

    /// Minimum article length in characters (overrides per-site defaults)
    #[arg(long)]
    min_chars: Option<usize>,

    /// Summary format: json (default) or yaml
    #[arg(long, short, default_value = "json")]
    format: String,

    /// Print every progress event as a JSON line on stderr
    #[arg(long)]
    events: bool,
}

impl ConvertArgs {
    fn options(&self) -> ConvertOptions {
        let timeout = Duration::from_millis(self.timeout);
        ConvertOptions {
            output_dir: self.output.clone(),
            download_images: self.download_images,
            filter_site_chrome: self.filter_site_chrome,
            use_shared_browser: !self.no_shared_browser,
            min_chars: self.min_chars,
            render: RenderOptions {
                nav_timeout: timeout,
                ..RenderOptions::default()
            },
            policy: FetchPolicy {
                max_attempts: self.retries,
                ..FetchPolicy::default()
            },
            http: HttpSettings {
                request_timeout: timeout,
                ..HttpSettings::default()
            },
        }
    }
}

/// Run the convert command
pub async fn run_convert(args: ConvertArgs) -> Result<()> {
    let jobs = get_jobs(&args).await?;

    if jobs.is_empty() {
        eprintln!("No URLs or HTML files found.");
        std::process::exit(1);
    }

    eprintln!(
        "Converting {} item{} into {}...",
        jobs.len(),
        if jobs.len() == 1 { "" } else { "s" },
        args.output.display()
    );

    let orchestrator = Arc::new(Orchestrator::new(args.options())?);
    let mut handle = orchestrator.spawn(jobs);

    let stopper = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stop requested, finishing current step...");
            stopper.request_stop();
        }
    });

    while let Some(event) = handle.next_event().await {
        report(&event, args.events)?;
    }

    let summary = handle.join().await.context("Batch worker failed")?;
    print_summary(&summary, &args.format)?;

    eprintln!("Done: {}/{} OK", summary.completed, summary.total);
    if summary.stopped {
        eprintln!("Stopped before all items were processed.");
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary, format: &str) -> Result<()> {
    let output = match format {
        "yaml" | "yml" => serde_yaml::to_string(summary)?,
        _ => serde_json::to_string(summary)?,
    };
    println!("{}", output.trim_end());
    Ok(())
}

fn report(event: &ProgressEvent, as_json: bool) -> Result<()> {
    if as_json {
        eprintln!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let index = event.job_index.unwrap_or(0);
    match event.kind {
        EventKind::JobStarted => eprintln!(
            "  -> [{}/{}] {}",
            index,
            event.job_total,
            truncate(event.str("label").unwrap_or(""), 60)
        ),
        EventKind::Detail => {
            if let Some(message) = event.str("message") {
                eprintln!("     {}: {}", event.str("key").unwrap_or("info"), message);
            }
        }
        EventKind::JobDone => eprintln!("     OK {}", event.str("path").unwrap_or("")),
        EventKind::Error => eprintln!("     FAILED {}", event.str("error").unwrap_or("")),
        EventKind::Init | EventKind::Stopped | EventKind::BatchDone => {}
    }
    Ok(())
}

/// Get jobs from FILE, --url, --stdin and --files
async fn get_jobs(args: &ConvertArgs) -> Result<Vec<Job>> {
    if args.file.is_none() && args.url.is_empty() && !args.stdin && args.files.is_none() {
        eprintln!("Usage:");
        eprintln!("  mdfetch convert <urls.md>             Convert URLs listed in a file");
        eprintln!("  mdfetch convert <page.html>           Convert a saved HTML page");
        eprintln!("  mdfetch convert --url <URL>           Convert a single URL (repeatable)");
        eprintln!("  mdfetch convert --stdin               Read URLs from stdin");
        eprintln!("  mdfetch convert --files '<PATTERN>'   Convert local HTML files");
        std::process::exit(1);
    }

    let mut inputs: Vec<String> = args.url.clone();

    if let Some(file) = &args.file {
        let lower = file.to_ascii_lowercase();
        if lower.ends_with(".html") || lower.ends_with(".htm") {
            if !PathBuf::from(file).exists() {
                anyhow::bail!("Failed to read file: {}", file);
            }
            inputs.push(file.clone());
        } else {
            let content = fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read file: {}", file))?;
            inputs.extend(extract_urls(&content));
        }
    }

    if args.stdin {
        let stdin = io::stdin();
        inputs.extend(stdin.lock().lines().map_while(|line| line.ok()));
    }

    if let Some(pattern) = &args.files {
        let paths = glob::glob(pattern).with_context(|| format!("Invalid pattern: {}", pattern))?;
        for path in paths.filter_map(|entry| entry.ok()) {
            inputs.push(path.display().to_string());
        }
    }

    let jobs = inputs
        .iter()
        .filter_map(|line| Job::parse_input(0, line))
        .enumerate()
        .map(|(i, mut job)| {
            job.id = i as u64 + 1;
            job
        })
        .collect();
    Ok(jobs)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
