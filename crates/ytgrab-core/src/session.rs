//! Download session state machine.
//!
//! One session drives exactly one (reference, format, destination) job from
//! precondition checks through engine invocation, retry, and completion
//! reporting. Sessions are single-use: a finished session is discarded.
//!
//! Retry uses a fixed back-off delay, the same constant for every attempt.
//! Cancellation is cooperative: the flag is observed between items in
//! multi-item workflows and between retry attempts, never by interrupting
//! an in-progress transfer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::engine::{EngineError, EngineProgressCallback, FetchOptions, MediaEngine};
use crate::preflight::check_connectivity;
use crate::progress::ProgressAggregator;
use crate::reference::{ReferenceKind, SourceReference, read_reference_list};

/// The three download workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// One content link, one engine invocation.
    Single,
    /// A file of links downloaded as independent single-item jobs.
    ListBatch,
    /// A collection link expanded by the engine in one invocation.
    Collection,
}

impl WorkflowKind {
    /// The reference shape this workflow consumes.
    #[must_use]
    pub const fn reference_kind(self) -> ReferenceKind {
        match self {
            Self::Single => ReferenceKind::SingleLink,
            Self::ListBatch => ReferenceKind::ListFile,
            Self::Collection => ReferenceKind::CollectionLink,
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::ListBatch => write!(f, "list batch"),
            Self::Collection => write!(f, "collection"),
        }
    }
}

/// Everything one job needs, fixed at start time.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// The validated source reference.
    pub reference: SourceReference,
    /// The validated destination directory.
    pub destination: PathBuf,
    /// Engine-native format selector.
    pub selector: String,
    /// Which workflow drives the job.
    pub kind: WorkflowKind,
}

/// Session lifecycle states.
///
/// `Running` re-enters itself through retry attempts; `Succeeded` and
/// `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started.
    Idle,
    /// Preconditions being checked.
    Validating,
    /// Engine invocations in progress.
    Running,
    /// All items completed.
    Succeeded,
    /// Terminal failure (error, exhausted retries, or cancellation).
    Failed,
}

/// Synchronous caller decision on whether an existing output may be
/// overwritten.
pub type ConfirmOverwrite = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Retry bookkeeping for one item.
#[derive(Debug)]
struct RetryState {
    attempts: u32,
    max_attempts: u32,
    last_error: Option<String>,
}

impl RetryState {
    const fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            last_error: None,
        }
    }

    const fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    fn record(&mut self, error: &EngineError) {
        self.last_error = Some(error.to_string());
    }

    const fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Drives one job through the state machine.
pub struct DownloadSession {
    spec: JobSpec,
    engine: Arc<dyn MediaEngine>,
    config: DownloadConfig,
    aggregator: Arc<ProgressAggregator>,
    cancelled: Arc<AtomicBool>,
    confirm_overwrite: Option<ConfirmOverwrite>,
    state: SessionState,
}

impl DownloadSession {
    /// Create a session for one job.
    #[must_use]
    pub fn new(
        spec: JobSpec,
        engine: Arc<dyn MediaEngine>,
        config: DownloadConfig,
        aggregator: Arc<ProgressAggregator>,
        cancelled: Arc<AtomicBool>,
        confirm_overwrite: Option<ConfirmOverwrite>,
    ) -> Self {
        Self {
            spec,
            engine,
            config,
            aggregator,
            cancelled,
            confirm_overwrite,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Run the job to a terminal state; returns overall success.
    ///
    /// Emits the terminal `AllFinished` event before returning, so callers
    /// observing the event channel see it after every per-item event.
    pub async fn run(mut self) -> bool {
        self.transition(SessionState::Validating);

        if !check_connectivity(
            &self.config.connectivity_probe_addr,
            self.config.connectivity_timeout(),
        )
        .await
        {
            self.aggregator.fail(
                "No internet connection detected. Check your connection and try again."
                    .to_string(),
            );
            self.transition(SessionState::Failed);
            self.aggregator.finish_all(false);
            return false;
        }

        self.transition(SessionState::Running);
        let success = match self.spec.kind {
            WorkflowKind::Single => self.run_single().await,
            WorkflowKind::ListBatch => self.run_batch().await,
            WorkflowKind::Collection => self.run_collection().await,
        };

        self.transition(if success {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        });
        self.aggregator.finish_all(success);
        success
    }

    async fn run_single(&self) -> bool {
        let SourceReference::SingleLink(url) = self.spec.reference.clone() else {
            self.aggregator
                .fail("reference does not match the single-item workflow".to_string());
            return false;
        };

        let title = self.probe_title(&url).await;
        let label = title.clone().unwrap_or_else(|| url.clone());
        self.aggregator.begin(&label);

        if let Some(title) = &title {
            if self.declined_overwrite(title) {
                info!("Keeping existing output for {title}; item treated as complete");
                self.aggregator.complete_item();
                return true;
            }
        }

        self.fetch_with_retry(&url).await
    }

    async fn run_batch(&self) -> bool {
        let SourceReference::ListFile(path) = self.spec.reference.clone() else {
            self.aggregator
                .fail("reference does not match the batch workflow".to_string());
            return false;
        };

        let load = match read_reference_list(&path) {
            Ok(load) => load,
            Err(e) => {
                self.aggregator.fail(e.to_string());
                return false;
            }
        };
        if load.references.is_empty() {
            self.aggregator
                .fail(format!("No valid references found in {}", path.display()));
            return false;
        }
        info!(
            "{} valid URLs loaded from {} ({} lines skipped)",
            load.references.len(),
            path.display(),
            load.skipped
        );

        let total = load.references.len();
        let mut all_succeeded = true;
        for (index, reference) in load.references.iter().enumerate() {
            if self.is_cancelled() {
                self.aggregator.fail("Download cancelled".to_string());
                return false;
            }
            let SourceReference::SingleLink(url) = reference else {
                continue;
            };

            let title = self.probe_title(url).await;
            let label = title.clone().unwrap_or_else(|| url.clone());
            self.aggregator.begin_item(index + 1, total, &label);

            if let Some(title) = &title {
                if self.declined_overwrite(title) {
                    info!("Keeping existing output for {title}; item treated as complete");
                    self.aggregator.complete_item();
                    continue;
                }
            }

            // A failed item is recorded but never stops the batch.
            if !self.fetch_with_retry(url).await {
                warn!("Item {} of {total} failed; continuing with the batch", index + 1);
                all_succeeded = false;
            }
        }
        all_succeeded
    }

    async fn run_collection(&self) -> bool {
        let SourceReference::CollectionLink(url) = self.spec.reference.clone() else {
            self.aggregator
                .fail("reference does not match the collection workflow".to_string());
            return false;
        };

        // Simulate-only probe to size the collection before committing to
        // the transfer.
        let report = match self.engine.probe(&url, true).await {
            Ok(report) => report,
            Err(e) => {
                self.aggregator.fail(format!("Collection probe failed: {e}"));
                return false;
            }
        };

        let count = report.item_count.unwrap_or(0);
        if count == 0 {
            info!("Collection {url} is empty; nothing to download");
            return true;
        }

        if self.is_cancelled() {
            self.aggregator.fail("Download cancelled".to_string());
            return false;
        }

        let title = report.title.unwrap_or_else(|| url.clone());
        self.aggregator.begin(&format!("{title} ({count} items)"));
        self.fetch_with_retry(&url).await
    }

    /// Invoke the engine for one reference, retrying transient failures up
    /// to the configured budget with a fixed delay between attempts.
    async fn fetch_with_retry(&self, url: &str) -> bool {
        let mut retry = RetryState::new(self.config.max_attempts);
        let options = self.fetch_options();

        loop {
            retry.begin_attempt();
            debug!(
                "Engine fetch attempt {}/{} for {url}",
                retry.attempts, retry.max_attempts
            );

            match self
                .engine
                .fetch(
                    url,
                    &self.spec.selector,
                    &self.spec.destination,
                    &options,
                    self.progress_callback(),
                )
                .await
            {
                Ok(()) => {
                    self.aggregator.complete_item();
                    return true;
                }
                Err(e) => {
                    retry.record(&e);
                    if !e.is_retryable() {
                        self.aggregator.fail(format!("Download failed: {e}"));
                        return false;
                    }
                    if retry.exhausted() {
                        self.aggregator.fail(format!(
                            "Download failed after {} attempts: {}",
                            retry.attempts,
                            retry.last_error.as_deref().unwrap_or("unknown error")
                        ));
                        return false;
                    }
                    warn!(
                        "Retryable engine failure (attempt {}/{}): {e}",
                        retry.attempts, retry.max_attempts
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                    if self.is_cancelled() {
                        self.aggregator.fail("Download cancelled".to_string());
                        return false;
                    }
                }
            }
        }
    }

    /// Best-effort title probe; failures only cost the nicer label.
    async fn probe_title(&self, url: &str) -> Option<String> {
        match self.engine.probe(url, false).await {
            Ok(report) => report.title,
            Err(e) => {
                debug!("Title probe for {url} failed: {e}");
                None
            }
        }
    }

    /// Whether an existing output for this title should be kept.
    ///
    /// Only true when the file exists and the registered confirmation
    /// callback answers "no". With no callback registered the engine's
    /// overwrite flag applies.
    fn declined_overwrite(&self, title: &str) -> bool {
        let output = self
            .spec
            .destination
            .join(format!("{title}.{}", self.config.preferred_container));
        if !output.exists() {
            return false;
        }
        match &self.confirm_overwrite {
            Some(confirm) => !confirm(title),
            None => false,
        }
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            socket_timeout: self.config.socket_timeout(),
            merge_container: self.config.preferred_container.clone(),
            overwrite: true,
            expand_collection: matches!(self.spec.kind, WorkflowKind::Collection),
        }
    }

    fn progress_callback(&self) -> EngineProgressCallback {
        let aggregator = Arc::clone(&self.aggregator);
        Arc::new(move |sample| aggregator.handle(&sample))
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state: {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
