//! Download configuration.
//!
//! All knobs the orchestration layer exposes: retry budget and back-off,
//! engine socket timeout, preferred container, the synthetic "best
//! available" selector, format cache capacity, and the preflight probe
//! settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum number of engine invocations per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between retry attempts, in seconds.
///
/// The back-off is deliberately a flat constant rather than exponential;
/// download retries here recover from brief connection drops, not from
/// sustained server pressure.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default socket timeout passed to the media engine, in seconds.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;

/// Default capacity of the format selection cache.
pub const DEFAULT_FORMAT_CACHE_CAPACITY: usize = 16;

/// Default address for the connectivity preflight probe (public DNS).
pub const DEFAULT_CONNECTIVITY_PROBE_ADDR: &str = "8.8.8.8:53";

/// Default timeout for the connectivity preflight probe, in seconds.
pub const DEFAULT_CONNECTIVITY_TIMEOUT_SECS: u64 = 5;

/// Configuration for download orchestration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Default destination directory for downloaded files.
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Preferred container extension for variant selection and merge output.
    #[serde(default = "default_container")]
    pub preferred_container: String,

    /// Engine-native selector for "best available, video+audio".
    #[serde(default = "default_best_selector")]
    pub best_selector: String,

    /// Maximum engine invocations per item (initial attempt included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between retry attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Socket timeout for each engine invocation, in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,

    /// Capacity of the format selection cache (oldest entry evicted).
    #[serde(default = "default_cache_capacity")]
    pub format_cache_capacity: usize,

    /// Name of the muxing/transcoding executable that must be on the PATH.
    #[serde(default = "default_muxer")]
    pub muxer_binary: String,

    /// Socket address used by the connectivity preflight probe.
    #[serde(default = "default_probe_addr")]
    pub connectivity_probe_addr: String,

    /// Timeout for the connectivity preflight probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub connectivity_timeout_secs: u64,
}

fn default_destination() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_best_selector() -> String {
    "bestvideo[ext=mp4]+bestaudio[ext=mp4]/best[ext=mp4]".to_string()
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

const fn default_socket_timeout() -> u64 {
    DEFAULT_SOCKET_TIMEOUT_SECS
}

const fn default_cache_capacity() -> usize {
    DEFAULT_FORMAT_CACHE_CAPACITY
}

fn default_muxer() -> String {
    "ffmpeg".to_string()
}

fn default_probe_addr() -> String {
    DEFAULT_CONNECTIVITY_PROBE_ADDR.to_string()
}

const fn default_probe_timeout() -> u64 {
    DEFAULT_CONNECTIVITY_TIMEOUT_SECS
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            preferred_container: default_container(),
            best_selector: default_best_selector(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            format_cache_capacity: DEFAULT_FORMAT_CACHE_CAPACITY,
            muxer_binary: default_muxer(),
            connectivity_probe_addr: default_probe_addr(),
            connectivity_timeout_secs: DEFAULT_CONNECTIVITY_TIMEOUT_SECS,
        }
    }
}

impl DownloadConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the destination directory.
    #[must_use]
    pub fn with_destination(mut self, destination: PathBuf) -> Self {
        self.destination = destination;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the fixed retry delay.
    #[must_use]
    pub const fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Clamp out-of-range values to workable ones.
    ///
    /// A retry budget of zero would mean "never invoke the engine", so it is
    /// raised to one; a zero cache capacity degenerates to capacity one.
    pub fn validate(&mut self) {
        self.max_attempts = self.max_attempts.max(1);
        self.format_cache_capacity = self.format_cache_capacity.max(1);
    }

    /// The fixed delay observed between retry attempts.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// The socket timeout for each engine invocation.
    #[must_use]
    pub const fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    /// The timeout for the connectivity preflight probe.
    #[must_use]
    pub const fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.preferred_container, "mp4");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert!(config.best_selector.contains("bestvideo"));
    }

    #[test]
    fn test_validate_clamps_zero_values() {
        let mut config = DownloadConfig {
            max_attempts: 0,
            format_cache_capacity: 0,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.format_cache_capacity, 1);
    }

    #[test]
    fn test_deserialize_with_missing_fields_uses_defaults() {
        let config: DownloadConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.muxer_binary, "ffmpeg");
        assert_eq!(config.socket_timeout_secs, DEFAULT_SOCKET_TIMEOUT_SECS);
        assert_eq!(config.connectivity_probe_addr, "8.8.8.8:53");
    }

    #[test]
    fn test_builder_style_overrides() {
        let config = DownloadConfig::new()
            .with_max_attempts(7)
            .with_retry_delay_secs(1);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }
}
