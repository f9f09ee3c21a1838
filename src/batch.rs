//! Batch orchestration
//!
//! Jobs run one after another on a single task. Each job resolves its
//! adapter, brings the shared browser into the state the adapter wants,
//! fetches, post-processes and writes its Markdown file. A failing job is
//! reported and the batch moves on; a stop request ends the batch at the
//! next checkpoint. The shared browser is torn down on every exit path.

use crate::adapter::{AdapterRegistry, FetchContext};
use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::cancel::{CancelToken, Cancelled};
use crate::config::ConvertOptions;
use crate::decode::decode_html;
use crate::error::FetchError;
use crate::http::HttpFetcher;
use crate::images::{ImageDownloader, ImagePipeline, NoImages};
use crate::job::{FetchResult, Job, JobArtifact, JobKind};
use crate::postprocess::{derive_filename, normalize_headings, write_markdown};
use crate::progress::{ChannelSink, EventKind, ProgressEvent, ProgressSink};
use crate::render::{Html2TextRenderer, MarkdownRenderer};
use crate::session::{BrowserSessionManager, ProcessPolicy, Reconciled};
use crate::sites::{builtin_registry, digest_markup, GENERIC};
use crate::strategy::StrategyExecutor;
use chrono::Local;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Resolve,
    ReconcileBrowser,
    Execute,
    Gate,
    Report,
    Done,
    Stopped,
}

/// Batch counters. `completed + failed <= total` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchState {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub phase: Phase,
    pub cancel_requested: bool,
}

impl BatchState {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            phase: Phase::Init,
            cancel_requested: false,
        }
    }

    pub fn snapshot(&self) -> BatchState {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub index: usize,
    pub id: u64,
    pub label: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<JobArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a batch run did. Jobs after a stop have no outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: bool,
    pub outcomes: Vec<JobOutcome>,
}

pub struct Orchestrator {
    registry: Arc<AdapterRegistry>,
    launcher: Arc<dyn BrowserLauncher>,
    http: Arc<HttpFetcher>,
    renderer: Arc<dyn MarkdownRenderer>,
    images: Arc<dyn ImagePipeline>,
    options: ConvertOptions,
}

impl Orchestrator {
    /// Built-in adapters, a local Chrome and the default renderer.
    pub fn new(options: ConvertOptions) -> Result<Self, FetchError> {
        let http = Arc::new(HttpFetcher::new(options.http.clone())?);
        let renderer: Arc<dyn MarkdownRenderer> = Arc::new(Html2TextRenderer::default());
        let executor = Arc::new(StrategyExecutor::new(options.policy.clone()));
        let registry = Arc::new(builtin_registry(executor, renderer.clone()));
        let images: Arc<dyn ImagePipeline> = if options.download_images {
            Arc::new(ImageDownloader::new(http.clone()))
        } else {
            Arc::new(NoImages)
        };
        let launcher = Arc::new(ChromeLauncher::new(options.http.user_agent.clone()));

        Ok(Self {
            registry,
            launcher,
            http,
            renderer,
            images,
            options,
        })
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImagePipeline>) -> Self {
        self.images = images;
        self
    }

    /// Run `jobs` in order, publishing progress to `sink`.
    ///
    /// Ends with exactly one `batch_done`, or exactly one `stopped` when a
    /// stop was requested. A panic inside a job is re-raised after teardown.
    pub async fn run_batch(
        &self,
        jobs: &[Job],
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> BatchSummary {
        let total = jobs.len();
        let mut state = BatchState::new(total);
        let mut session =
            BrowserSessionManager::new(self.launcher.clone(), self.options.use_shared_browser);
        let mut outcomes = Vec::with_capacity(total);

        sink.emit(
            ProgressEvent::new(EventKind::Init, None, total)
                .with("output_dir", self.options.output_dir.display().to_string())
                .with("shared_browser", self.options.use_shared_browser),
        );
        tracing::info!(total, "batch started");

        let run = AssertUnwindSafe(self.run_jobs(
            jobs,
            &mut state,
            &mut session,
            &mut outcomes,
            sink,
            cancel,
        ))
        .catch_unwind()
        .await;

        // The only place the shared browser is closed at batch end
        session.shutdown().await;

        let stopped = match run {
            Ok(Ok(())) => false,
            Ok(Err(Cancelled)) => true,
            Err(panic) => {
                tracing::error!("batch worker panicked; browser torn down");
                std::panic::resume_unwind(panic)
            }
        };

        let kind = if stopped {
            state.cancel_requested = true;
            state.phase = Phase::Stopped;
            EventKind::Stopped
        } else {
            state.phase = Phase::Done;
            EventKind::BatchDone
        };
        let snapshot = state.snapshot();
        sink.emit(
            ProgressEvent::new(kind, None, total)
                .with("completed", snapshot.completed)
                .with("failed", snapshot.failed)
                .with("total", snapshot.total),
        );
        tracing::info!(
            completed = snapshot.completed,
            failed = snapshot.failed,
            stopped,
            "batch finished"
        );

        BatchSummary {
            total,
            completed: snapshot.completed,
            failed: snapshot.failed,
            stopped,
            outcomes,
        }
    }

    async fn run_jobs(
        &self,
        jobs: &[Job],
        state: &mut BatchState,
        session: &mut BrowserSessionManager,
        outcomes: &mut Vec<JobOutcome>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<(), Cancelled> {
        let total = jobs.len();

        for (i, job) in jobs.iter().enumerate() {
            let index = i + 1;
            cancel.checkpoint()?;

            state.phase = Phase::Resolve;
            sink.emit(
                ProgressEvent::new(EventKind::JobStarted, Some(index), total)
                    .with("label", job.label())
                    .with("kind", serde_json::to_value(job.kind).unwrap_or_default()),
            );

            let outcome = match self.process_job(index, job, state, session, sink, cancel).await {
                Ok(artifact) => {
                    state.completed += 1;
                    let mut event = ProgressEvent::new(EventKind::JobDone, Some(index), total)
                        .with("path", artifact.path.display().to_string())
                        .with("chars", artifact.chars)
                        .with("completed", state.completed)
                        .with("failed", state.failed);
                    if let Some(title) = &artifact.title {
                        event = event.with("title", title.as_str());
                    }
                    sink.emit(event);
                    JobOutcome {
                        index,
                        id: job.id,
                        label: job.label().to_string(),
                        ok: true,
                        artifact: Some(artifact),
                        error: None,
                    }
                }
                Err(e) if e.is_cancelled() => return Err(Cancelled),
                Err(e) => {
                    state.failed += 1;
                    tracing::warn!(index, job = %job.label(), error = %e, "job failed");
                    sink.emit(
                        ProgressEvent::new(EventKind::Error, Some(index), total)
                            .with("label", job.label())
                            .with("error", e.to_string())
                            .with("completed", state.completed)
                            .with("failed", state.failed),
                    );
                    JobOutcome {
                        index,
                        id: job.id,
                        label: job.label().to_string(),
                        ok: false,
                        artifact: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(())
    }

    /// `Err(FetchError::Cancelled)` means the batch must stop.
    async fn process_job(
        &self,
        index: usize,
        job: &Job,
        state: &mut BatchState,
        session: &mut BrowserSessionManager,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<JobArtifact, FetchError> {
        let total = state.total;
        let detail = |key: &str, message: String| {
            sink.emit(
                ProgressEvent::new(EventKind::Detail, Some(index), total)
                    .with("key", key)
                    .with("message", message),
            )
        };

        let (result, base_url) = match job.kind {
            JobKind::Url => {
                let url = Url::parse(job.value.trim())
                    .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", job.value, e)))?;
                let adapter = self.registry.resolve_url(&url);
                detail("adapter", adapter.name().to_string());

                state.phase = Phase::ReconcileBrowser;
                let policy = ProcessPolicy::from_preference(adapter.prefers_shared_process());
                match session.reconcile(Some(policy), cancel).await? {
                    Reconciled::Opened => detail("browser", "shared browser opened".to_string()),
                    Reconciled::Closed => {
                        detail("browser", "shared browser closed for isolated job".to_string())
                    }
                    Reconciled::Degraded { reason } => detail(
                        "browser",
                        format!("shared browser unavailable, continuing without it: {}", reason),
                    ),
                    Reconciled::Unchanged => {}
                }

                state.phase = Phase::Execute;
                let ctx = FetchContext::new(
                    &url,
                    self.launcher.as_ref(),
                    &self.http,
                    cancel,
                    &self.options,
                )
                .with_job_index(index)
                .with_shared_browser(session.handle())
                .with_detail(&detail);
                let result = adapter.fetch(&ctx).await?;
                // Relative image links resolve against the page that was served
                let base_url = result
                    .final_url()
                    .and_then(|u| Url::parse(u).ok())
                    .unwrap_or(url);
                (result, Some(base_url))
            }
            JobKind::Html | JobKind::File => {
                session.reconcile(None, cancel).await?;
                state.phase = Phase::Execute;
                let html = match job.kind {
                    JobKind::File => {
                        let bytes = tokio::fs::read(&job.value)
                            .await
                            .map_err(|e| FetchError::Io(format!("{}: {}", job.value, e)))?;
                        decode_html(&bytes, None)
                    }
                    _ => job.value.clone(),
                };
                let result = digest_markup(
                    &GENERIC,
                    self.renderer.as_ref(),
                    &html,
                    job.metadata.get("title").cloned(),
                    self.options.filter_site_chrome,
                );
                let base_url = job.metadata.get("base_url").and_then(|u| Url::parse(u).ok());
                (result, base_url)
            }
        };

        state.phase = Phase::Gate;
        if !result.is_success() {
            let reason = result.error().unwrap_or("no content").to_string();
            return Err(FetchError::Exhausted(reason));
        }

        state.phase = Phase::Report;
        self.finish(job, result, base_url.as_ref(), &detail, cancel)
            .await
    }

    async fn finish(
        &self,
        job: &Job,
        result: FetchResult,
        base_url: Option<&Url>,
        detail: &(dyn Fn(&str, String) + Send + Sync),
        cancel: &CancelToken,
    ) -> Result<JobArtifact, FetchError> {
        let title = result.title().map(str::to_string);
        let mut markdown = normalize_headings(result.body(), title.as_deref());

        if let Some(base) = base_url {
            match self
                .images
                .process(&markdown, base, &self.options.output_dir, cancel)
                .await
            {
                Ok(rewritten) => markdown = rewritten,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(job = %job.label(), error = %e, "image processing failed");
                    detail("images", format!("image processing failed: {}", e));
                }
            }
        }

        cancel.checkpoint()?;
        let filename = derive_filename(title.as_deref(), job.label(), Local::now());
        let path = write_markdown(&self.options.output_dir, &filename, &markdown).await?;

        Ok(JobArtifact {
            title,
            path,
            chars: markdown.chars().count(),
        })
    }

    /// Run `jobs` on a background task.
    pub fn spawn(self: Arc<Self>, jobs: Vec<Job>) -> BatchHandle {
        let cancel = CancelToken::new();
        let (tx, events) = mpsc::unbounded_channel();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let sink = ChannelSink::new(tx);
            self.run_batch(&jobs, &sink, &token).await
        });
        BatchHandle {
            cancel,
            events,
            task,
        }
    }
}

/// Caller's side of a spawned batch.
pub struct BatchHandle {
    cancel: CancelToken,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    task: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub fn request_stop(&self) {
        self.cancel.request_stop();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Next event; `None` once the batch has finished and every event was read.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub async fn join(self) -> Result<BatchSummary, JoinError> {
        self.task.await
    }
}
