//! Error taxonomy for the release pipeline.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Failures while producing firmware artifacts from a build tree.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown board '{0}'")]
    UnknownBoard(String),

    #[error("frozen manifest not found: {0}")]
    MissingManifest(PathBuf),

    #[error("failed to spawn toolchain '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("toolchain exited with {status}")]
    Toolchain { status: ExitStatus },

    #[error("expected artifact '{0}' missing after successful toolchain run")]
    MissingArtifact(ArtifactKind),

    #[error("artifact '{0}' is empty")]
    EmptyArtifact(ArtifactKind),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while assembling or reopening a release bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("artifact set is missing '{0}'")]
    IncompleteSet(ArtifactKind),

    #[error("destination already contains a bundle: {0}")]
    DestinationExists(PathBuf),

    #[error("no bundle manifest found in {0}")]
    MissingManifest(PathBuf),

    #[error("artifact file for '{kind}' missing from bundle: {path}")]
    MissingArtifactFile { kind: ArtifactKind, path: PathBuf },

    #[error("artifact '{kind}' does not match its manifest entry (expected {expected} bytes, found {actual})")]
    SizeMismatch {
        kind: ArtifactKind,
        expected: u64,
        actual: u64,
    },

    #[error("invalid bundle manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while publishing a bundle to the device-management service.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("registry rejected the request ({status}): {detail}")]
    ServerRejected { status: u16, detail: String },

    #[error("upload of '{kind}' failed after {attempts} attempts")]
    RetriesExhausted {
        kind: ArtifactKind,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("bundle is not publishable: {0}")]
    IncompleteBundle(#[from] BundleError),
}

impl UploadError {
    /// Whether a retry could plausibly succeed. Only transport-class
    /// failures (timeouts, 5xx responses) qualify; credential problems and
    /// server rejections will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(UploadError::Transport("timed out".to_string()).is_transient());
        assert!(!UploadError::Auth("bad key".to_string()).is_transient());
        assert!(
            !UploadError::ServerRejected {
                status: 422,
                detail: "bad artifact".to_string(),
            }
            .is_transient()
        );
    }
}
