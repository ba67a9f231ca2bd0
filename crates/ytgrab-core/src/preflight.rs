//! Precondition checks performed before committing to a download.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Best-effort reachability probe.
///
/// Attempts a TCP connection to `addr` within `timeout`. Any failure means
/// "assume offline"; the caller decides what to do with that.
pub async fn check_connectivity(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Connectivity probe to {addr} failed: {e}");
            false
        }
        Err(_) => {
            debug!("Connectivity probe to {addr} timed out");
            false
        }
    }
}

/// Verify that the muxing/transcoding executable exists on the search path.
///
/// # Errors
///
/// Returns [`Error::Precondition`] when the binary cannot be found; this is
/// a hard failure, never retried.
pub fn check_muxer(binary: &str) -> Result<PathBuf> {
    which::which(binary).map_err(|_| {
        Error::Precondition(format!(
            "required tool '{binary}' not found on the search path"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connectivity_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        assert!(check_connectivity(&addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_connectivity_refused_is_false() {
        // Bind then drop so the port is very likely closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(!check_connectivity(&addr, Duration::from_secs(1)).await);
    }

    #[test]
    fn test_missing_muxer_is_precondition_error() {
        let result = check_muxer("nonexistent-muxer-binary-xyz");
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn test_present_binary_resolves() {
        // `sh` is present on any POSIX system this crate builds on.
        let result = check_muxer("sh");
        assert!(result.is_ok());
    }
}
