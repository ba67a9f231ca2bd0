//! Progress aggregation.
//!
//! The media engine emits raw, stringly-typed progress samples. The
//! aggregator parses and clamps them into [`ProgressEvent`]s on an ordered
//! channel, suppresses duplicate completion signals, and carries the
//! item-index prefix for multi-item workflows. One malformed sample must
//! never abort a download: bad percents are logged and swallowed.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::{EnginePhase, EngineProgress};

/// Event types delivered to the presentation layer.
///
/// Delivered in emission order, at most once each. `AllFinished` is the
/// terminal notification for a session; everything after it belongs to the
/// next session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressEvent {
    /// Bytes are moving; percent is clamped to [0, 100].
    Downloading {
        /// Completion percentage of the current item.
        percent: f64,
        /// Engine-reported transfer rate, verbatim.
        rate: Option<String>,
        /// Engine-reported time remaining, verbatim.
        eta: Option<String>,
    },
    /// A new item began transferring.
    ItemStarted {
        /// Display label, prefixed with "i of n" in multi-item workflows.
        label: String,
    },
    /// The current item finished transferring.
    ItemFinished,
    /// The session (or one item of it) failed.
    Failed {
        /// Human-readable failure message.
        message: String,
    },
    /// Terminal notification: the whole workflow finished.
    AllFinished {
        /// Logical AND of all item results.
        success: bool,
    },
}

/// Converts raw engine samples into [`ProgressEvent`]s on a channel.
///
/// Shared between the download session (item boundaries, failures) and the
/// engine progress callback (byte-level samples); all methods take `&self`.
#[derive(Debug)]
pub struct ProgressAggregator {
    events: mpsc::UnboundedSender<ProgressEvent>,
    item_finished: AtomicBool,
}

impl ProgressAggregator {
    /// Create an aggregator emitting onto the given channel.
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            events,
            item_finished: AtomicBool::new(false),
        }
    }

    /// Announce a single-item workflow's item.
    pub fn begin(&self, label: &str) {
        self.item_finished.store(false, Ordering::SeqCst);
        self.emit(ProgressEvent::ItemStarted {
            label: label.to_string(),
        });
    }

    /// Announce item `index` of `total`, prefixing the label accordingly.
    ///
    /// The index comes from the download session, never from the engine.
    pub fn begin_item(&self, index: usize, total: usize, label: &str) {
        self.item_finished.store(false, Ordering::SeqCst);
        self.emit(ProgressEvent::ItemStarted {
            label: format!("{index} of {total}: {label}"),
        });
    }

    /// Process one raw engine sample.
    pub fn handle(&self, sample: &EngineProgress) {
        match sample.phase {
            EnginePhase::Downloading => {
                let Some(raw) = sample.percent.as_deref() else {
                    return;
                };
                let Some(percent) = parse_percent(raw) else {
                    warn!("Discarding malformed progress percent: {raw:?}");
                    return;
                };
                self.emit(ProgressEvent::Downloading {
                    percent,
                    rate: sample.rate.clone(),
                    eta: sample.eta.clone(),
                });
            }
            EnginePhase::Finished => self.complete_item(),
        }
    }

    /// Mark the current item finished, emitting `ItemFinished` exactly once.
    pub fn complete_item(&self) {
        if !self.item_finished.swap(true, Ordering::SeqCst) {
            self.emit(ProgressEvent::ItemFinished);
        }
    }

    /// Report a failure message for the current item or session.
    pub fn fail(&self, message: String) {
        self.emit(ProgressEvent::Failed { message });
    }

    /// Emit the terminal notification.
    pub fn finish_all(&self, success: bool) {
        self.emit(ProgressEvent::AllFinished { success });
    }

    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver means no presentation layer is listening;
        // the download itself carries on.
        let _ = self.events.send(event);
    }
}

/// Parse an engine percent string ("42.3%", " 97.1% ") into a clamped value.
fn parse_percent(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    let value: f64 = trimmed.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0))
}
