//! yt-dlp media engine adapter.
//!
//! Wraps the `yt-dlp` executable behind the [`MediaEngine`] capability:
//! `probe` runs a simulate-only `--dump-single-json` inspection and maps
//! the JSON catalog into [`VariantDescriptor`]s; `fetch` streams the
//! process's `--newline` progress output, scraping `[download]` lines into
//! raw progress samples. stderr text is classified into the retryability
//! taxonomy so the session can decide what to retry without ever seeing a
//! yt-dlp flag or message.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::engine::{
    EngineError, EnginePhase, EngineProgress, EngineProgressCallback, FetchOptions, MediaEngine,
    ProbeReport, VariantDescriptor,
};

/// Media engine backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    binary: PathBuf,
}

impl YtDlpEngine {
    /// Use `yt-dlp` from the search path.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
        }
    }

    /// Use a specific executable.
    #[must_use]
    pub const fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(
        &self,
        reference: &str,
        expand_collection: bool,
    ) -> Result<ProbeReport, EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--dump-single-json").arg("--no-warnings");
        if expand_collection {
            // Flat expansion lists collection entries without resolving
            // each one, which keeps the count probe cheap.
            cmd.arg("--flat-playlist").arg("--yes-playlist");
        } else {
            cmd.arg("--no-playlist");
        }
        cmd.arg("--").arg(reference);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Probing {reference} (expand_collection={expand_collection})");
        let output = cmd.output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        parse_probe_output(&output.stdout)
    }

    async fn fetch(
        &self,
        reference: &str,
        selector: &str,
        destination: &Path,
        options: &FetchOptions,
        on_progress: EngineProgressCallback,
    ) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--newline")
            .arg("--no-warnings")
            .arg("-f")
            .arg(selector)
            .arg("-o")
            .arg(destination.join("%(title)s.%(ext)s"))
            .arg("--socket-timeout")
            .arg(options.socket_timeout.as_secs().to_string())
            .arg("--merge-output-format")
            .arg(&options.merge_container);
        if options.expand_collection {
            cmd.arg("--yes-playlist");
        } else {
            cmd.arg("--no-playlist");
        }
        if options.overwrite {
            cmd.arg("--force-overwrites");
        } else {
            cmd.arg("--no-overwrites");
        }
        cmd.arg("--").arg(reference);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Fetching {reference} with selector {selector}");
        let mut child = cmd.spawn().map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Other("engine stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(sample) = parse_progress_line(&line) {
                on_progress(sample);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Other(format!("waiting for engine: {e}")))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if status.success() {
            // The reliable completion signal is the exit status, not any
            // particular progress line.
            on_progress(EngineProgress::phase_only(EnginePhase::Finished));
            Ok(())
        } else {
            Err(classify_failure(&stderr_text))
        }
    }
}

/// yt-dlp's `--dump-single-json` document, reduced to what the resolver
/// needs.
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    entries: Option<Vec<serde_json::Value>>,
    playlist_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    ext: Option<String>,
    height: Option<u32>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

impl RawFormat {
    fn into_descriptor(self) -> VariantDescriptor {
        VariantDescriptor {
            has_video: codec_present(self.vcodec.as_deref()),
            has_audio: codec_present(self.acodec.as_deref()),
            id: self.format_id,
            container: self.ext.unwrap_or_default(),
            height: self.height,
            filesize: self.filesize.or(self.filesize_approx),
        }
    }
}

/// A missing codec field counts as present; only an explicit `"none"`
/// marks the stream as absent.
fn codec_present(codec: Option<&str>) -> bool {
    codec.is_none_or(|c| c != "none")
}

fn parse_probe_output(stdout: &[u8]) -> Result<ProbeReport, EngineError> {
    let info: RawInfo = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::Other(format!("unparseable probe output: {e}")))?;
    Ok(ProbeReport {
        title: info.title,
        item_count: info.entries.as_ref().map(Vec::len).or(info.playlist_count),
        catalog: info
            .formats
            .into_iter()
            .map(RawFormat::into_descriptor)
            .collect(),
    })
}

/// Scrape one `--newline` output line into a raw progress sample.
///
/// Matches lines like
/// `[download]  42.3% of 10.00MiB at 1.21MiB/s ETA 00:12`.
fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    if !line.starts_with("[download]") {
        return None;
    }
    if line.contains("has already been downloaded") {
        return Some(EngineProgress::phase_only(EnginePhase::Finished));
    }
    let pattern = Regex::new(
        r"\[download\]\s+(?P<percent>\d+(?:\.\d+)?%)\s+of\s+~?\s*\S+(?:\s+at\s+(?P<rate>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
    )
    .ok()?;
    let caps = pattern.captures(line)?;
    Some(EngineProgress {
        phase: EnginePhase::Downloading,
        percent: caps.name("percent").map(|m| m.as_str().to_string()),
        rate: caps.name("rate").map(|m| m.as_str().to_string()),
        eta: caps.name("eta").map(|m| m.as_str().to_string()),
    })
}

fn spawn_error(e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::Unavailable("yt-dlp executable not found on the search path".to_string())
    } else {
        EngineError::Other(format!("failed to start engine: {e}"))
    }
}

/// Map yt-dlp stderr text onto the retryability taxonomy.
fn classify_failure(stderr: &str) -> EngineError {
    let summary = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("engine exited with an error")
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        EngineError::Timeout(summary)
    } else if lower.contains("urlopen error")
        || lower.contains("connection")
        || lower.contains("name resolution")
        || lower.contains("network")
        || lower.contains("http error 5")
    {
        EngineError::Network(summary)
    } else if lower.contains("permission denied") {
        EngineError::Permission(summary)
    } else if lower.contains("no space left") || lower.contains("disk full") {
        EngineError::Disk(summary)
    } else if lower.contains("requested format is not available") {
        EngineError::FormatNotFound(summary)
    } else {
        EngineError::Other(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line_full() {
        let sample =
            parse_progress_line("[download]  42.3% of 10.00MiB at 1.21MiB/s ETA 00:12").unwrap();
        assert_eq!(sample.phase, EnginePhase::Downloading);
        assert_eq!(sample.percent.as_deref(), Some("42.3%"));
        assert_eq!(sample.rate.as_deref(), Some("1.21MiB/s"));
        assert_eq!(sample.eta.as_deref(), Some("00:12"));
    }

    #[test]
    fn test_parse_progress_line_estimated_size() {
        let sample =
            parse_progress_line("[download]   5.0% of ~ 120.00MiB at 500.00KiB/s ETA 04:05")
                .unwrap();
        assert_eq!(sample.percent.as_deref(), Some("5.0%"));
    }

    #[test]
    fn test_parse_progress_line_already_downloaded_is_finished() {
        let sample = parse_progress_line(
            "[download] /tmp/My Video.mp4 has already been downloaded",
        )
        .unwrap();
        assert_eq!(sample.phase, EnginePhase::Finished);
    }

    #[test]
    fn test_non_progress_lines_ignored() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("[download] Destination: /tmp/My Video.mp4").is_none());
        assert!(parse_progress_line("[Merger] Merging formats into \"out.mp4\"").is_none());
    }

    #[test]
    fn test_parse_probe_output_maps_catalog() {
        let json = br#"{
            "title": "Test Video",
            "formats": [
                {"format_id": "137", "ext": "mp4", "height": 1080, "filesize": 500,
                 "vcodec": "avc1.640028", "acodec": "none"},
                {"format_id": "140", "ext": "m4a", "filesize": 128,
                 "vcodec": "none", "acodec": "mp4a.40.2"},
                {"format_id": "18", "ext": "mp4", "height": 360}
            ]
        }"#;
        let report = parse_probe_output(json).unwrap();

        assert_eq!(report.title.as_deref(), Some("Test Video"));
        assert_eq!(report.item_count, None);
        assert_eq!(report.catalog.len(), 3);

        let video = &report.catalog[0];
        assert!(video.has_video);
        assert!(!video.has_audio);
        assert_eq!(video.height, Some(1080));

        let audio = &report.catalog[1];
        assert!(!audio.has_video);
        assert!(audio.has_audio);

        // Missing codec fields count as present.
        let legacy = &report.catalog[2];
        assert!(legacy.has_video);
        assert!(legacy.has_audio);
    }

    #[test]
    fn test_parse_probe_output_collection_count() {
        let json = br#"{"title": "My Playlist", "entries": [{}, {}, {}]}"#;
        let report = parse_probe_output(json).unwrap();
        assert_eq!(report.item_count, Some(3));
        assert!(report.catalog.is_empty());
    }

    #[test]
    fn test_parse_probe_output_playlist_count_fallback() {
        let json = br#"{"title": "My Playlist", "playlist_count": 12}"#;
        let report = parse_probe_output(json).unwrap();
        assert_eq!(report.item_count, Some(12));
    }

    #[test]
    fn test_parse_probe_output_garbage_is_error() {
        let result = parse_probe_output(b"not json at all");
        assert!(matches!(result, Err(EngineError::Other(_))));
    }

    #[test]
    fn test_classify_timeout_is_retryable() {
        let err = classify_failure("ERROR: unable to download video data: timed out");
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_network_is_retryable() {
        let err = classify_failure(
            "ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>",
        );
        assert!(matches!(err, EngineError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_permission_is_permanent() {
        let err = classify_failure("ERROR: unable to open for writing: Permission denied");
        assert!(matches!(err, EngineError::Permission(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_format_not_found_is_permanent() {
        let err = classify_failure("ERROR: Requested format is not available");
        assert!(matches!(err, EngineError::FormatNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_unknown_keeps_last_line() {
        let err = classify_failure("WARNING: something\nERROR: some new failure mode\n");
        assert!(matches!(
            err,
            EngineError::Other(message) if message == "ERROR: some new failure mode"
        ));
    }
}
