//! Source reference and destination validation.
//!
//! A reference is one of three things: a single content link, a path to a
//! newline-delimited file of links, or a collection (playlist) link. Links
//! must use an accepted transfer scheme and point at the target platform;
//! validation is pure and synchronous, with the one exception that
//! destination validation may create the destination directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Domain suffixes recognized as belonging to the target platform.
pub const PLATFORM_DOMAINS: &[&str] = &["youtube.com", "youtu.be"];

/// Accepted transfer scheme prefixes for link references.
const ACCEPTED_SCHEMES: &[&str] = &["http://", "https://"];

/// Which shape of reference the caller claims to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A single content link.
    SingleLink,
    /// A path to a newline-delimited file of links.
    ListFile,
    /// A collection (playlist) link.
    CollectionLink,
}

/// A validated pointer to remote content or to a list of such pointers.
///
/// Immutable once created; consumed by exactly one download session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceReference {
    /// One content link.
    SingleLink(String),
    /// A file of links, one per line.
    ListFile(PathBuf),
    /// A collection (playlist) link.
    CollectionLink(String),
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleLink(url) | Self::CollectionLink(url) => write!(f, "{url}"),
            Self::ListFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Result of loading a reference list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListLoad {
    /// Valid references, in file order.
    pub references: Vec<SourceReference>,
    /// Number of non-blank lines that failed validation.
    pub skipped: usize,
}

/// Validate a raw reference string (or list-file path) of the given kind.
///
/// # Errors
///
/// Returns [`Error::InvalidReference`] for malformed or off-platform links,
/// [`Error::FileNotFound`]/[`Error::NotReadable`] for bad list files.
pub fn validate_reference(kind: ReferenceKind, raw: &str) -> Result<SourceReference> {
    let raw = raw.trim();
    match kind {
        ReferenceKind::SingleLink => {
            validate_link(raw).map(|url| SourceReference::SingleLink(url.to_string()))
        }
        ReferenceKind::CollectionLink => {
            validate_link(raw).map(|url| SourceReference::CollectionLink(url.to_string()))
        }
        ReferenceKind::ListFile => {
            let path = PathBuf::from(raw);
            if !path.is_file() {
                return Err(Error::FileNotFound(path));
            }
            // Probe readability now so the failure surfaces before a session
            // is spawned rather than halfway into a batch.
            if let Err(e) = fs::File::open(&path) {
                return Err(Error::NotReadable {
                    path,
                    reason: e.to_string(),
                });
            }
            Ok(SourceReference::ListFile(path))
        }
    }
}

fn validate_link(raw: &str) -> Result<&str> {
    if raw.is_empty() {
        return Err(Error::InvalidReference("empty reference".to_string()));
    }
    let lower = raw.to_lowercase();
    if !ACCEPTED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return Err(Error::InvalidReference(format!(
            "{raw}: must start with http:// or https://"
        )));
    }
    if !host_is_platform(&lower) {
        return Err(Error::InvalidReference(format!(
            "{raw}: not a recognized platform link"
        )));
    }
    Ok(raw)
}

/// Extract the host fragment and match it against the platform allow-list.
///
/// Suffix matching on the registered domain, so `www.youtube.com` and
/// `music.youtube.com` qualify while `notyoutube.com.evil.example` does not.
fn host_is_platform(lower_url: &str) -> bool {
    let Some(rest) = lower_url.split_once("://").map(|(_, r)| r) else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    // Strip credentials and port.
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, h)| h)
        .split(':')
        .next()
        .unwrap_or("");
    PLATFORM_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Resolve and prepare a destination directory.
///
/// The path is absolutized against the current working directory, the
/// directory is created if missing (idempotent), and writability is verified
/// by creating and discarding a temporary probe file. Safe to call
/// repeatedly.
///
/// # Errors
///
/// Returns [`Error::NotWritable`] when the directory cannot be created or
/// written to.
pub fn validate_destination(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    fs::create_dir_all(&absolute).map_err(|e| Error::NotWritable {
        path: absolute.clone(),
        reason: format!("cannot create directory: {e}"),
    })?;

    let probe = tempfile::Builder::new()
        .prefix(".ytgrab-write-probe")
        .tempfile_in(&absolute)
        .map_err(|e| Error::NotWritable {
            path: absolute.clone(),
            reason: format!("write probe failed: {e}"),
        })?;
    drop(probe);

    debug!("Destination validated: {}", absolute.display());
    Ok(absolute)
}

/// Read a list file into validated single-link references.
///
/// Blank lines are ignored. Non-blank lines that fail link validation are
/// counted and logged, never fatal.
///
/// # Errors
///
/// Returns [`Error::FileNotFound`]/[`Error::NotReadable`] when the file
/// itself cannot be read.
pub fn read_reference_list(path: &Path) -> Result<ListLoad> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::NotReadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    let mut references = Vec::new();
    let mut skipped = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match validate_reference(ReferenceKind::SingleLink, line) {
            Ok(reference) => references.push(reference),
            Err(e) => {
                warn!("Skipping invalid line in {}: {e}", path.display());
                skipped += 1;
            }
        }
    }

    debug!(
        "Loaded {} valid references from {} ({} skipped)",
        references.len(),
        path.display(),
        skipped
    );
    Ok(ListLoad { references, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_valid_single_link() {
        let reference = validate_reference(
            ReferenceKind::SingleLink,
            "https://www.youtube.com/watch?v=abc123",
        )
        .unwrap();
        assert_eq!(
            reference,
            SourceReference::SingleLink("https://www.youtube.com/watch?v=abc123".to_string())
        );
    }

    #[test]
    fn test_short_domain_accepted() {
        assert!(validate_reference(ReferenceKind::SingleLink, "https://youtu.be/abc123").is_ok());
    }

    #[test]
    fn test_scheme_required() {
        let err = validate_reference(ReferenceKind::SingleLink, "www.youtube.com/watch?v=abc")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_off_platform_rejected() {
        let err =
            validate_reference(ReferenceKind::SingleLink, "https://example.com/video").unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_lookalike_domain_rejected() {
        // Suffix matching must anchor on a dot boundary.
        let err = validate_reference(
            ReferenceKind::SingleLink,
            "https://notyoutube.com/watch?v=abc",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_subdomain_accepted() {
        assert!(
            validate_reference(
                ReferenceKind::CollectionLink,
                "https://music.youtube.com/playlist?list=PLx",
            )
            .is_ok()
        );
    }

    #[test]
    fn test_missing_list_file() {
        let err = validate_reference(ReferenceKind::ListFile, "/no/such/file.txt").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_list_file_accepted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "https://youtu.be/abc").unwrap();
        let raw = file.path().to_string_lossy().to_string();
        let reference = validate_reference(ReferenceKind::ListFile, &raw).unwrap();
        assert!(matches!(reference, SourceReference::ListFile(_)));
    }

    #[test]
    fn test_destination_created_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("downloads").join("videos");

        let first = validate_destination(&dest).unwrap();
        assert!(first.is_dir());

        // Second call must succeed against the now-existing directory.
        let second = validate_destination(&dest).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_destination_relative_is_absolutized() {
        let resolved = validate_destination(Path::new(".")).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_read_reference_list_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "https://www.youtube.com/watch?v=one").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not a url").unwrap();
        writeln!(file, "https://youtu.be/two").unwrap();

        let load = read_reference_list(file.path()).unwrap();
        assert_eq!(load.references.len(), 2);
        assert_eq!(load.skipped, 1);
    }

    #[test]
    fn test_read_reference_list_missing_file() {
        let err = read_reference_list(Path::new("/no/such/list.txt")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
