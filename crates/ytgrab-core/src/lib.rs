//! Ytgrab Core Library
//!
//! This crate provides the download orchestration and format-resolution
//! engine for Ytgrab:
//! - Source reference and destination validation
//! - Catalog reduction into a ranked, deduplicated selection menu
//! - A retry-aware download session state machine (single item, list
//!   batch, collection)
//! - Progress aggregation onto an ordered event channel
//! - An orchestrator owning at most one active session at a time
//! - A yt-dlp adapter behind the [`engine::MediaEngine`] capability
//!
//! # Error Handling
//!
//! This crate uses typed errors throughout; engine failures carry an
//! explicit retryability class. See the [`error`] module for details.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod formats;
pub mod orchestrator;
pub mod preflight;
pub mod progress;
pub mod reference;
pub mod session;
pub mod ytdlp;

pub use cache::FormatCache;
pub use config::{
    DEFAULT_CONNECTIVITY_PROBE_ADDR, DEFAULT_FORMAT_CACHE_CAPACITY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_SOCKET_TIMEOUT_SECS, DownloadConfig,
};
pub use engine::{
    EngineError, EnginePhase, EngineProgress, EngineProgressCallback, FetchOptions, MediaEngine,
    ProbeReport, VariantDescriptor,
};
pub use error::{Error, Result};
pub use formats::{BEST_AVAILABLE_LABEL, SelectionEntry, resolve_formats};
pub use orchestrator::{Orchestrator, StartOutcome};
pub use preflight::{check_connectivity, check_muxer};
pub use progress::{ProgressAggregator, ProgressEvent};
pub use reference::{
    ListLoad, PLATFORM_DOMAINS, ReferenceKind, SourceReference, read_reference_list,
    validate_destination, validate_reference,
};
pub use session::{ConfirmOverwrite, DownloadSession, JobSpec, SessionState, WorkflowKind};
pub use ytdlp::YtDlpEngine;
