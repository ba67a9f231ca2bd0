//! Download orchestration.
//!
//! The orchestrator owns at most one active download session at a time.
//! `start` validates synchronously, rejects when busy, and spawns the
//! session onto a worker task; `cancel` sets the cooperative flag and
//! blocks the caller until the session reaches a terminal state. Progress
//! and terminal notifications fan out on a single ordered channel.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::FormatCache;
use crate::config::DownloadConfig;
use crate::engine::MediaEngine;
use crate::error::Result;
use crate::formats::{SelectionEntry, resolve_formats};
use crate::preflight::check_muxer;
use crate::progress::{ProgressAggregator, ProgressEvent};
use crate::reference::{ReferenceKind, validate_destination, validate_reference};
use crate::session::{ConfirmOverwrite, DownloadSession, JobSpec, WorkflowKind};

/// Outcome of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was spawned.
    Started,
    /// Another session is still running; nothing changed.
    Rejected,
}

/// Handle to the one session that may be running.
struct ActiveSession {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<bool>,
}

/// Owns the single download worker and the UI-facing operations.
pub struct Orchestrator {
    engine: Arc<dyn MediaEngine>,
    config: DownloadConfig,
    events: mpsc::UnboundedSender<ProgressEvent>,
    confirm_overwrite: Option<ConfirmOverwrite>,
    format_cache: FormatCache,
    active: Mutex<Option<ActiveSession>>,
}

impl Orchestrator {
    /// Create an orchestrator around a media engine.
    ///
    /// Returns the orchestrator plus the receiving end of its event
    /// channel; events arrive in emission order, at most once each.
    #[must_use]
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        mut config: DownloadConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        config.validate();
        let (events, receiver) = mpsc::unbounded_channel();
        let format_cache = FormatCache::new(config.format_cache_capacity);
        (
            Self {
                engine,
                config,
                events,
                confirm_overwrite: None,
                format_cache,
                active: Mutex::new(None),
            },
            receiver,
        )
    }

    /// Register the synchronous overwrite-confirmation callback.
    #[must_use]
    pub fn with_confirm_overwrite(mut self, confirm: ConfirmOverwrite) -> Self {
        self.confirm_overwrite = Some(confirm);
        self
    }

    /// Start a download workflow.
    ///
    /// Validation and precondition failures are returned synchronously and
    /// leave no trace; a `Rejected` outcome means another session is still
    /// running and nothing changed. After `Started`, everything else
    /// arrives on the event channel, ending with `AllFinished`.
    ///
    /// # Errors
    ///
    /// Returns validation errors for a bad reference or destination and
    /// [`crate::error::Error::Precondition`] when the muxing tool is
    /// missing.
    pub async fn start(
        &self,
        kind: WorkflowKind,
        reference: &str,
        destination: &Path,
        selector: &str,
    ) -> Result<StartOutcome> {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            if !session.handle.is_finished() {
                warn!("Rejecting start request: a download session is already running");
                return Ok(StartOutcome::Rejected);
            }
        }

        let reference = validate_reference(kind.reference_kind(), reference)?;
        let destination = validate_destination(destination)?;
        check_muxer(&self.config.muxer_binary)?;

        let spec = JobSpec {
            reference,
            destination,
            selector: selector.to_string(),
            kind,
        };
        info!("Starting {kind} download: {}", spec.reference);

        let cancelled = Arc::new(AtomicBool::new(false));
        let aggregator = Arc::new(ProgressAggregator::new(self.events.clone()));
        let session = DownloadSession::new(
            spec,
            Arc::clone(&self.engine),
            self.config.clone(),
            aggregator,
            Arc::clone(&cancelled),
            self.confirm_overwrite.clone(),
        );
        let handle = tokio::spawn(session.run());

        *active = Some(ActiveSession { cancelled, handle });
        Ok(StartOutcome::Started)
    }

    /// Request cancellation and wait for the session to terminate.
    ///
    /// A no-op returning `None` when nothing is running; otherwise blocks
    /// the caller until the session reaches a terminal state and returns
    /// its overall result.
    pub async fn cancel(&self) -> Option<bool> {
        let mut active = self.active.lock().await;
        let Some(session) = active.take() else {
            debug!("Cancel requested with no active session");
            return None;
        };

        info!("Cancellation requested; waiting for the session to terminate");
        session.cancelled.store(true, Ordering::SeqCst);
        match session.handle.await {
            Ok(success) => Some(success),
            Err(e) => {
                error!("Session task failed: {e}");
                Some(false)
            }
        }
    }

    /// Whether a session is currently running.
    pub async fn is_busy(&self) -> bool {
        let active = self.active.lock().await;
        active.as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    /// Resolve the selection menu for a single-item reference.
    ///
    /// Consults the bounded format cache before probing the engine; the
    /// UI-facing "get formats" operation.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an off-platform reference or the
    /// engine's error when the probe fails.
    pub async fn fetch_formats(&self, reference: &str) -> Result<Vec<SelectionEntry>> {
        let validated = validate_reference(ReferenceKind::SingleLink, reference)?;
        let url = validated.to_string();

        if let Some(cached) = self.format_cache.get(&url) {
            debug!("Format cache hit for {url}");
            return Ok(cached);
        }

        let report = self.engine.probe(&url, false).await?;
        let entries = resolve_formats(&report.catalog, &self.config);
        info!("Resolved {} selectable formats for {url}", entries.len());
        self.format_cache.insert(url, entries.clone());
        Ok(entries)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MockMediaEngine, ProbeReport, VariantDescriptor};
    use crate::error::Error;

    fn catalog_engine() -> MockMediaEngine {
        let mut engine = MockMediaEngine::new();
        engine.expect_probe().times(1).returning(|_, _| {
            Ok(ProbeReport {
                title: Some("My Video".to_string()),
                catalog: vec![VariantDescriptor {
                    id: "137".to_string(),
                    container: "mp4".to_string(),
                    height: Some(1080),
                    filesize: Some(500),
                    has_video: true,
                    has_audio: true,
                }],
                item_count: None,
            })
        });
        engine
    }

    #[tokio::test]
    async fn test_fetch_formats_resolves_menu() {
        let (orchestrator, _rx) =
            Orchestrator::new(Arc::new(catalog_engine()), DownloadConfig::default());

        let entries = orchestrator
            .fetch_formats("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].label, "1080p");
    }

    #[tokio::test]
    async fn test_fetch_formats_second_call_hits_cache() {
        // The mock enforces a single probe; the second call must be served
        // from the cache.
        let (orchestrator, _rx) =
            Orchestrator::new(Arc::new(catalog_engine()), DownloadConfig::default());

        let url = "https://www.youtube.com/watch?v=abc";
        let first = orchestrator.fetch_formats(url).await.unwrap();
        let second = orchestrator.fetch_formats(url).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fetch_formats_rejects_bad_reference() {
        let (orchestrator, _rx) = Orchestrator::new(
            Arc::new(MockMediaEngine::new()),
            DownloadConfig::default(),
        );

        let result = orchestrator.fetch_formats("https://example.com/video").await;
        assert!(matches!(result, Err(Error::InvalidReference(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_bad_reference_synchronously() {
        let (orchestrator, _rx) = Orchestrator::new(
            Arc::new(MockMediaEngine::new()),
            DownloadConfig::default(),
        );

        let result = orchestrator
            .start(
                WorkflowKind::Single,
                "not a url",
                Path::new("/tmp"),
                "best",
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidReference(_))));
        assert!(!orchestrator.is_busy().await);
    }

    #[tokio::test]
    async fn test_start_rejects_missing_muxer_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let config = DownloadConfig {
            muxer_binary: "nonexistent-muxer-binary-xyz".to_string(),
            ..Default::default()
        };
        let (orchestrator, _rx) = Orchestrator::new(Arc::new(MockMediaEngine::new()), config);

        let result = orchestrator
            .start(
                WorkflowKind::Single,
                "https://www.youtube.com/watch?v=abc",
                dir.path(),
                "best",
            )
            .await;
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert!(!orchestrator.is_busy().await);
    }

    #[tokio::test]
    async fn test_cancel_with_no_session_is_noop() {
        let (orchestrator, _rx) = Orchestrator::new(
            Arc::new(MockMediaEngine::new()),
            DownloadConfig::default(),
        );
        assert_eq!(orchestrator.cancel().await, None);
    }
}
