//! Format resolution: catalog reduction into a user-selectable menu.
//!
//! Raw catalogs contain dozens of near-duplicate variants (different
//! bitrates and codecs at the same resolution), most without paired audio.
//! The resolver keys on resolution, keeps the richest file per resolution,
//! and pairs audio-less video with the best standalone audio track so every
//! menu row is directly downloadable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::DownloadConfig;
use crate::engine::VariantDescriptor;

/// Label of the synthetic entry that always heads the menu.
pub const BEST_AVAILABLE_LABEL: &str = "Best available (video+audio)";

/// One row of the selection menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Human-readable label ("Best available (video+audio)", "1080p", ...).
    pub label: String,
    /// Engine-native selector expression to fetch this choice.
    pub selector: String,
    /// Estimated download size in bytes, when any component size is known.
    pub estimated_size: Option<u64>,
}

/// Reduce a variant catalog to an ordered selection menu.
///
/// The first entry is always the synthetic "best available" choice built
/// from the configured selector, independent of catalog contents. The
/// remaining entries are one per distinct resolution within the preferred
/// container, in strictly descending resolution order. A catalog with no
/// usable resolutions yields the synthetic entry alone; that is not an
/// error.
#[must_use]
pub fn resolve_formats(
    catalog: &[VariantDescriptor],
    config: &DownloadConfig,
) -> Vec<SelectionEntry> {
    let container = config.preferred_container.as_str();

    let mut entries = vec![SelectionEntry {
        label: BEST_AVAILABLE_LABEL.to_string(),
        selector: config.best_selector.clone(),
        estimated_size: None,
    }];

    let audio = fallback_audio(catalog, container);

    // One surviving variant per resolution: the largest known file wins,
    // deduplicating multiple encodings at the same height.
    let mut by_height: HashMap<u32, &VariantDescriptor> = HashMap::new();
    for variant in catalog
        .iter()
        .filter(|v| v.has_video && v.container == container)
    {
        let Some(height) = variant.height else {
            continue;
        };
        by_height
            .entry(height)
            .and_modify(|current| {
                if variant.filesize.unwrap_or(0) > current.filesize.unwrap_or(0) {
                    *current = variant;
                }
            })
            .or_insert(variant);
    }

    let mut heights: Vec<u32> = by_height.keys().copied().collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));

    for height in heights {
        let Some(variant) = by_height.get(&height) else {
            continue;
        };
        let (selector, estimated_size) = if variant.has_audio {
            (variant.id.clone(), variant.filesize)
        } else if let Some(audio) = audio {
            (
                format!("{}+{}", variant.id, audio.id),
                sum_known(variant.filesize, audio.filesize),
            )
        } else {
            // No standalone audio in the catalog: fall back to the engine's
            // generic "best audio in the same container" expression.
            (
                format!("{}+bestaudio[ext={container}]", variant.id),
                variant.filesize,
            )
        };
        entries.push(SelectionEntry {
            label: format!("{height}p"),
            selector,
            estimated_size,
        });
    }

    entries
}

/// The audio-only variant used to complete audio-less video selections.
///
/// Restricted to the preferred container; the largest known file size wins,
/// with unknown sizes treated as zero.
#[must_use]
pub fn fallback_audio<'a>(
    catalog: &'a [VariantDescriptor],
    container: &str,
) -> Option<&'a VariantDescriptor> {
    catalog
        .iter()
        .filter(|v| !v.has_video && v.has_audio && v.container == container)
        .max_by_key(|v| v.filesize.unwrap_or(0))
}

const fn sum_known(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}
