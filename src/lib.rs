//! mdfetch: fetch web articles as clean Markdown
//!
//! Site adapters pick how a page is acquired (plain HTTP or headless
//! Chrome), a shared retry executor applies backoff and quality gates, and
//! a batch orchestrator runs jobs sequentially with cooperative cancellation
//! and progress events.
//!
//! Commands:
//! - convert: fetch URLs or local HTML and write Markdown files
//! - adapters: list adapters or resolve a URL

pub mod adapter;
pub mod batch;
pub mod browser;
pub mod cancel;
pub mod config;
pub mod convert;
pub mod decode;
pub mod error;
pub mod extract;
pub mod http;
pub mod images;
pub mod job;
pub mod list_adapters;
pub mod postprocess;
pub mod progress;
pub mod render;
pub mod session;
pub mod sites;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Adapter, AdapterRegistry, FetchContext};
pub use batch::{BatchHandle, BatchSummary, Orchestrator};
pub use cancel::{CancelToken, Cancelled};
pub use config::{ConvertOptions, FetchPolicy};
pub use error::FetchError;
pub use job::{FetchResult, Job, JobKind};
pub use progress::{EventKind, ProgressEvent, ProgressSink};
