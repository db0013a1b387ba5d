//! The remote device-management boundary.
//!
//! Publishing a release is the single state-changing operation in the whole
//! pipeline with externally visible effects, so the boundary is a trait:
//! the production client talks to the real service, tests substitute a
//! recording fake.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::artifact::ArtifactKind;
use crate::error::UploadError;
use crate::target::DeploymentTarget;

/// API credentials for the device-management service.
///
/// Supplied out-of-band (environment), passed explicitly into the uploader,
/// never written to logs or bundles.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub project: String,
}

impl Credentials {
    pub fn new(api_key: String, project: String) -> Self {
        Self { api_key, project }
    }

    /// Read credentials from `SHIPIT_API_KEY` / `SHIPIT_PROJECT`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SHIPIT_API_KEY").ok()?;
        let project = std::env::var("SHIPIT_PROJECT").ok()?;
        Some(Self { api_key, project })
    }
}

// The API key must never leak through debug formatting.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[redacted]")
            .field("project", &self.project)
            .finish()
    }
}

/// One artifact upload request.
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    /// Fleet project the artifact belongs to.
    pub project: String,
    /// Blueprint the artifact is tagged with.
    pub blueprint: String,
    /// Remote package name the artifact is filed under.
    pub package: String,
    /// Release version string.
    pub version: String,
    /// Which of the four firmware artifacts this is.
    pub kind: ArtifactKind,
    /// Raw artifact bytes, passed through unmodified.
    pub content: Bytes,
}

/// Server-side identifier of an uploaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub id: String,
}

/// Request to publish a release from uploaded artifacts.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub project: String,
    pub blueprint: String,
    pub artifact_ids: Vec<String>,
    /// When true the service pushes the release to every device enrolled
    /// under the blueprint.
    pub rollout: bool,
}

/// Server-side identifier of a published release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub id: String,
}

/// Outcome of a successful publish. Transient; release history lives on
/// the remote service, not in this subsystem.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub target: DeploymentTarget,
    pub version: String,
    pub artifact_ids: Vec<String>,
    pub release_id: String,
}

/// Retry policy for transient transport failures during artifact uploads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per artifact, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after failed attempt `attempt` (1-based): the base
    /// delay doubled for each prior failure.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Remote firmware registry boundary.
#[async_trait]
pub trait FirmwareRegistry: Send + Sync {
    /// Upload one artifact's content under a blueprint and version.
    async fn upload_artifact(
        &self,
        credentials: &Credentials,
        upload: ArtifactUpload,
    ) -> Result<RemoteArtifact, UploadError>;

    /// Create a release from uploaded artifacts. When `request.rollout` is
    /// true this pushes firmware to physical devices in the field; callers
    /// must issue it at most once per pipeline run and never retry it.
    async fn create_release(
        &self,
        credentials: &Credentials,
        request: ReleaseRequest,
    ) -> Result<RemoteRelease, UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_api_key() {
        let credentials = Credentials::new("sk-very-secret".to_string(), "frog-fleet".to_string());

        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("[redacted]"));
        assert!(rendered.contains("frog-fleet"));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }
}
