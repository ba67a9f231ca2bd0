//! Media engine abstraction.
//!
//! The orchestration layer never talks to a concrete downloader directly.
//! Everything it needs is the narrow capability defined here: `probe` for
//! catalog/collection inspection without transfer, and `fetch` for the
//! actual byte transfer. The production adapter lives in [`crate::ytdlp`];
//! tests substitute a mock.
//!
//! Engine errors carry an explicit retryability class so the download
//! session can distinguish transient network trouble from permanent
//! failures without inspecting engine-specific message text.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One encoded variant from the media engine's catalog.
///
/// Produced by [`MediaEngine::probe`]; the format resolver only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Opaque engine-native format identifier.
    pub id: String,
    /// Container extension (e.g. "mp4", "webm").
    pub container: String,
    /// Vertical resolution in pixels; absent for audio-only variants.
    pub height: Option<u32>,
    /// File size in bytes when the engine reports one.
    pub filesize: Option<u64>,
    /// Whether the variant carries a video stream.
    pub has_video: bool,
    /// Whether the variant carries an audio stream.
    pub has_audio: bool,
}

/// Result of a no-transfer probe of a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Title of the item (or collection) when the engine reports one.
    pub title: Option<String>,
    /// Catalog of encoded variants for the item.
    pub catalog: Vec<VariantDescriptor>,
    /// Number of items in a collection, when probed with expansion.
    pub item_count: Option<usize>,
}

/// Options forwarded to each `fetch` invocation.
///
/// This is the entire option surface the orchestration layer exposes to an
/// engine; adapters map it onto their native vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Socket/connect timeout for the transfer.
    pub socket_timeout: Duration,
    /// Container to merge separately-fetched audio and video streams into.
    pub merge_container: String,
    /// Whether pre-existing output files may be overwritten.
    pub overwrite: bool,
    /// Whether a collection reference should be expanded into its items.
    pub expand_collection: bool,
}

/// Phase tag of a raw engine progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Bytes are being transferred.
    Downloading,
    /// The current item finished transferring.
    Finished,
}

/// A raw, stringly-typed progress sample as engines emit them.
///
/// Field values come straight from the engine's own progress output and may
/// be absent or malformed; the progress aggregator is responsible for
/// parsing and clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProgress {
    /// Which phase the engine is in.
    pub phase: EnginePhase,
    /// Percent string, e.g. `"42.3%"`.
    pub percent: Option<String>,
    /// Transfer rate string, e.g. `"1.2MiB/s"`.
    pub rate: Option<String>,
    /// Estimated time remaining string, e.g. `"00:12"`.
    pub eta: Option<String>,
}

impl EngineProgress {
    /// A bare sample for the given phase with no measurements attached.
    #[must_use]
    pub const fn phase_only(phase: EnginePhase) -> Self {
        Self {
            phase,
            percent: None,
            rate: None,
            eta: None,
        }
    }
}

/// Callback invoked for every raw progress sample an engine emits.
pub type EngineProgressCallback = Arc<dyn Fn(EngineProgress) + Send + Sync>;

/// Errors reported by a media engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Transient network failure (DNS, connection reset, 5xx).
    #[error("network error: {0}")]
    Network(String),

    /// The engine's socket/connect timeout elapsed.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The engine could not write its output.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Local disk failure (out of space, I/O error on write).
    #[error("disk error: {0}")]
    Disk(String),

    /// The requested format selector matches nothing.
    #[error("requested format not available: {0}")]
    FormatNotFound(String),

    /// The engine executable could not be started.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Anything else the engine reported.
    #[error("engine failure: {0}")]
    Other(String),
}

impl EngineError {
    /// Whether the failure class is transient.
    ///
    /// Network and timeout failures are retried by the download session;
    /// permission, disk, and format errors are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// The media engine capability consumed by the orchestration layer.
///
/// `probe` performs no transfer. `fetch` transfers one reference (or one
/// expanded collection) and reports raw progress through the callback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Inspect a reference without transferring anything.
    ///
    /// With `expand_collection` set, the report includes the collection's
    /// item count; otherwise the reference is treated as a single item and
    /// the report carries its variant catalog.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when the reference cannot be inspected.
    async fn probe(
        &self,
        reference: &str,
        expand_collection: bool,
    ) -> Result<ProbeReport, EngineError>;

    /// Transfer a reference to the destination directory.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] classified by retryability when the
    /// transfer fails.
    async fn fetch(
        &self,
        reference: &str,
        selector: &str,
        destination: &Path,
        options: &FetchOptions,
        on_progress: EngineProgressCallback,
    ) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_and_timeout_are_retryable() {
        assert!(EngineError::Network("connection reset".to_string()).is_retryable());
        assert!(EngineError::Timeout("read timed out".to_string()).is_retryable());
    }

    #[test]
    fn test_permanent_classes_are_not_retryable() {
        assert!(!EngineError::Permission("denied".to_string()).is_retryable());
        assert!(!EngineError::Disk("no space left on device".to_string()).is_retryable());
        assert!(!EngineError::FormatNotFound("999".to_string()).is_retryable());
        assert!(!EngineError::Unavailable("yt-dlp not found".to_string()).is_retryable());
        assert!(!EngineError::Other("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::Timeout("socket read".to_string());
        assert_eq!(err.to_string(), "operation timed out: socket read");
    }

    #[test]
    fn test_phase_only_sample_is_empty() {
        let sample = EngineProgress::phase_only(EnginePhase::Finished);
        assert_eq!(sample.phase, EnginePhase::Finished);
        assert!(sample.percent.is_none());
        assert!(sample.rate.is_none());
        assert!(sample.eta.is_none());
    }
}
