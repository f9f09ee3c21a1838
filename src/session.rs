//! Lifecycle of the batch's shared headless browser
//!
//! At most one shared browser is alive at a time. It is opened lazily by the
//! first job that wants it, closed before a job that must run in its own
//! process, and closed for good by [`BrowserSessionManager::shutdown`].

use crate::browser::{BrowserHandle, BrowserLauncher};
use crate::cancel::{CancelToken, Cancelled};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// How a job wants its browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessPolicy {
    /// Reuse the batch's long-lived browser.
    Shared,
    /// Run in a private browser; the shared one must be closed first.
    Isolated,
}

impl ProcessPolicy {
    pub fn from_preference(prefers_shared: bool) -> Self {
        if prefers_shared {
            ProcessPolicy::Shared
        } else {
            ProcessPolicy::Isolated
        }
    }
}

/// Only a shared browser is ever held; isolated jobs launch their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

/// The open shared browser.
struct BrowserSession {
    handle: Box<dyn BrowserHandle>,
    opened_at: DateTime<Utc>,
}

/// What a reconcile call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    Opened,
    Closed,
    /// Launch failed; the rest of the batch runs without a shared browser.
    Degraded { reason: String },
}

pub struct BrowserSessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    enabled: bool,
    session: Option<BrowserSession>,
    degraded: bool,
    opens: usize,
    closes: usize,
}

impl BrowserSessionManager {
    /// `enabled = false` never opens a shared browser.
    pub fn new(launcher: Arc<dyn BrowserLauncher>, enabled: bool) -> Self {
        Self {
            launcher,
            enabled,
            session: None,
            degraded: false,
            opens: 0,
            closes: 0,
        }
    }

    /// Bring the shared browser into the state `policy` needs.
    ///
    /// `None` (jobs that never touch a browser) leaves everything as is.
    pub async fn reconcile(
        &mut self,
        policy: Option<ProcessPolicy>,
        cancel: &CancelToken,
    ) -> Result<Reconciled, Cancelled> {
        cancel.checkpoint()?;
        match (policy, self.state()) {
            (None, _) => Ok(Reconciled::Unchanged),
            (Some(ProcessPolicy::Isolated), SessionState::Open) => {
                self.close_session().await;
                Ok(Reconciled::Closed)
            }
            (Some(ProcessPolicy::Isolated), SessionState::Closed) => Ok(Reconciled::Unchanged),
            (Some(ProcessPolicy::Shared), SessionState::Open) => Ok(Reconciled::Unchanged),
            (Some(ProcessPolicy::Shared), SessionState::Closed) => {
                if !self.enabled || self.degraded {
                    return Ok(Reconciled::Unchanged);
                }
                match self.launcher.launch(cancel).await {
                    Ok(handle) => {
                        self.session = Some(BrowserSession {
                            handle,
                            opened_at: Utc::now(),
                        });
                        self.opens += 1;
                        tracing::info!(opens = self.opens, "shared browser opened");
                        Ok(Reconciled::Opened)
                    }
                    Err(e) if e.is_cancelled() => Err(Cancelled),
                    Err(e) => {
                        self.degraded = true;
                        tracing::warn!(error = %e, "shared browser unavailable, continuing without it");
                        Ok(Reconciled::Degraded {
                            reason: e.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Close the shared browser if open. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        if self.session.is_some() {
            self.close_session().await;
        }
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.handle.close().await {
                tracing::warn!(error = %e, "closing shared browser failed");
            }
            self.closes += 1;
            tracing::info!(
                closes = self.closes,
                open_for_ms = (Utc::now() - session.opened_at).num_milliseconds(),
                "shared browser closed"
            );
        }
    }

    /// The shared browser for the current job, if one is open.
    pub fn handle(&self) -> Option<&dyn BrowserHandle> {
        self.session.as_ref().map(|s| s.handle.as_ref())
    }

    pub fn state(&self) -> SessionState {
        match self.session {
            Some(_) => SessionState::Open,
            None => SessionState::Closed,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn opens(&self) -> usize {
        self.opens
    }

    pub fn closes(&self) -> usize {
        self.closes
    }
}

impl Drop for BrowserSessionManager {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::warn!("browser session manager dropped with an open browser");
        }
    }
}
