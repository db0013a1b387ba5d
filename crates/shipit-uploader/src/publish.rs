//! The publish workflow.
//!
//! Artifact uploads tolerate transient transport failures with bounded,
//! backed-off retries. The release creation that can trigger a fleet
//! rollout is issued exactly once and never retried; re-issuing it takes a
//! new pipeline run.

use bytes::Bytes;
use tokio::time::sleep;
use tracing::{error, info, warn};

use shipit_core::artifact::ArtifactKind;
use shipit_core::bundle::ReleaseBundle;
use shipit_core::error::UploadError;
use shipit_core::registry::{
    ArtifactUpload, Credentials, FirmwareRegistry, ReleaseRequest, RemoteArtifact, RetryPolicy,
    UploadResult,
};
use shipit_core::target::DeploymentTarget;

/// Knobs for one publish operation.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Remote package name the artifacts are filed under.
    pub package: String,
    /// Retry policy for transient transport failures.
    pub retry: RetryPolicy,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            package: "main".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Publish a bundle under a deployment target.
pub async fn publish(
    registry: &dyn FirmwareRegistry,
    bundle: &ReleaseBundle,
    target: &DeploymentTarget,
    credentials: &Credentials,
    options: &PublishOptions,
) -> Result<UploadResult, UploadError> {
    if credentials.api_key.is_empty() {
        return Err(UploadError::Auth("API key is empty".to_string()));
    }
    if credentials.project.is_empty() {
        return Err(UploadError::Auth("project identifier is empty".to_string()));
    }
    bundle.verify()?;

    let version = bundle.version().version.clone();
    let mut artifact_ids = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        let path = bundle.artifact_path(kind);
        let content = std::fs::read(&path).map_err(shipit_core::error::BundleError::Io)?;
        let upload = ArtifactUpload {
            project: target.project.clone(),
            blueprint: target.blueprint.clone(),
            package: options.package.clone(),
            version: version.clone(),
            kind,
            content: Bytes::from(content),
        };
        let remote = upload_with_retry(registry, credentials, upload, &options.retry).await?;
        info!(kind = %kind, id = %remote.id, "Uploaded artifact");
        artifact_ids.push(remote.id);
    }

    // Issued exactly once: a retried release creation could double-trigger
    // a rollout to devices in the field.
    let request = ReleaseRequest {
        project: target.project.clone(),
        blueprint: target.blueprint.clone(),
        artifact_ids: artifact_ids.clone(),
        rollout: target.rollout,
    };
    let release = match registry.create_release(credentials, request).await {
        Ok(release) => release,
        Err(e) => {
            error!(
                deployment = %target.name,
                rollout = target.rollout,
                error = %e,
                "Release creation failed; remote release state is unknown"
            );
            return Err(e);
        }
    };

    info!(
        deployment = %target.name,
        version = %version,
        release = %release.id,
        rollout = target.rollout,
        "Published release"
    );
    Ok(UploadResult {
        target: target.clone(),
        version,
        artifact_ids,
        release_id: release.id,
    })
}

async fn upload_with_retry(
    registry: &dyn FirmwareRegistry,
    credentials: &Credentials,
    upload: ArtifactUpload,
    retry: &RetryPolicy,
) -> Result<RemoteArtifact, UploadError> {
    let kind = upload.kind;
    let mut attempt = 1u32;
    loop {
        match registry.upload_artifact(credentials, upload.clone()).await {
            Ok(remote) => return Ok(remote),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay_after(attempt);
                warn!(
                    kind = %kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient upload failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(UploadError::RetriesExhausted {
                    kind,
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use shipit_core::artifact::ArtifactSet;
    use shipit_core::bundle::VersionInfo;
    use shipit_core::registry::RemoteRelease;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Registry fake that records every call and injects scripted upload
    /// failures in order.
    struct RecordingRegistry {
        uploads: Mutex<Vec<ArtifactUpload>>,
        releases: Mutex<Vec<ReleaseRequest>>,
        upload_failures: Mutex<Vec<UploadError>>,
    }

    impl RecordingRegistry {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                releases: Mutex::new(Vec::new()),
                upload_failures: Mutex::new(Vec::new()),
            }
        }

        fn failing_with(failures: Vec<UploadError>) -> Self {
            let registry = Self::new();
            *registry.upload_failures.lock().unwrap() = failures;
            registry
        }

        fn upload_attempts(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }

        fn releases(&self) -> Vec<ReleaseRequest> {
            self.releases.lock().unwrap().clone()
        }

        fn rollouts_requested(&self) -> usize {
            self.releases().iter().filter(|r| r.rollout).count()
        }
    }

    #[async_trait]
    impl FirmwareRegistry for RecordingRegistry {
        async fn upload_artifact(
            &self,
            _credentials: &Credentials,
            upload: ArtifactUpload,
        ) -> Result<RemoteArtifact, UploadError> {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(upload);
            let count = uploads.len();
            drop(uploads);

            let mut failures = self.upload_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
            Ok(RemoteArtifact {
                id: format!("art-{}", count),
            })
        }

        async fn create_release(
            &self,
            _credentials: &Credentials,
            request: ReleaseRequest,
        ) -> Result<RemoteRelease, UploadError> {
            self.releases.lock().unwrap().push(request);
            Ok(RemoteRelease {
                id: "rel-1".to_string(),
            })
        }
    }

    fn fixture_bundle(root: &Path) -> ReleaseBundle {
        let mut set = ArtifactSet::new();
        for kind in ArtifactKind::ALL {
            let path = root.join(format!("{}.out", kind.as_str()));
            std::fs::write(&path, kind.as_str()).unwrap();
            set.insert(kind, path);
        }
        let version = VersionInfo {
            version: "v1.2.0".to_string(),
            commit_id: "deadbeef".to_string(),
            build_date: Utc::now(),
        };
        shipit_builder::bundle(&set, &version, &root.join("bundle")).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("test-key".to_string(), "frog-fleet".to_string())
    }

    fn target(rollout: bool) -> DeploymentTarget {
        DeploymentTarget {
            name: "beta".to_string(),
            project: "frog-fleet".to_string(),
            blueprint: "bp-beta".to_string(),
            rollout,
        }
    }

    fn fast_options() -> PublishOptions {
        PublishOptions {
            package: "main".to_string(),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        }
    }

    fn transport_error() -> UploadError {
        UploadError::Transport("connection reset".to_string())
    }

    #[tokio::test]
    async fn publish_uploads_every_artifact_and_creates_one_release() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry = RecordingRegistry::new();

        let result = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(registry.upload_attempts(), 4);
        assert_eq!(result.artifact_ids.len(), 4);
        assert_eq!(registry.releases().len(), 1);
        assert_eq!(result.release_id, "rel-1");
        assert_eq!(result.version, "v1.2.0");
    }

    #[tokio::test]
    async fn rollout_disabled_never_requests_a_rollout() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry = RecordingRegistry::new();

        publish(
            &registry,
            &bundle,
            &target(false),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(registry.rollouts_requested(), 0);
        let releases = registry.releases();
        assert_eq!(releases.len(), 1);
        assert!(!releases[0].rollout);
    }

    #[tokio::test]
    async fn transient_failures_retry_and_issue_exactly_one_rollout() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        // Two transient failures, both below the 3-attempt bound.
        let registry =
            RecordingRegistry::failing_with(vec![transport_error(), transport_error()]);

        let result = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap();

        // 4 artifacts + 2 retried attempts.
        assert_eq!(registry.upload_attempts(), 6);
        assert_eq!(result.artifact_ids.len(), 4);
        assert_eq!(registry.rollouts_requested(), 1);
        assert_eq!(registry.releases().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_and_nothing_is_released() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry = RecordingRegistry::failing_with(vec![
            transport_error(),
            transport_error(),
            transport_error(),
            transport_error(),
        ]);

        let err = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap_err();

        match err {
            UploadError::RetriesExhausted { kind, attempts, .. } => {
                assert_eq!(kind, ArtifactKind::Bootloader);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.upload_attempts(), 3);
        assert!(registry.releases().is_empty());
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry =
            RecordingRegistry::failing_with(vec![UploadError::Auth("bad key".to_string())]);

        let err = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Auth(_)));
        assert_eq!(registry.upload_attempts(), 1);
        assert!(registry.releases().is_empty());
    }

    #[tokio::test]
    async fn server_rejections_are_not_retried() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry = RecordingRegistry::failing_with(vec![UploadError::ServerRejected {
            status: 422,
            detail: "unsupported image".to_string(),
        }]);

        let err = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::ServerRejected { .. }));
        assert_eq!(registry.upload_attempts(), 1);
        assert!(registry.releases().is_empty());
    }

    #[tokio::test]
    async fn blank_credentials_fail_before_any_network_call() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        let registry = RecordingRegistry::new();
        let blank = Credentials::new(String::new(), "frog-fleet".to_string());

        let err = publish(&registry, &bundle, &target(true), &blank, &fast_options())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Auth(_)));
        assert_eq!(registry.upload_attempts(), 0);
    }

    #[tokio::test]
    async fn a_tampered_bundle_is_refused_before_upload() {
        let tmp = TempDir::new().unwrap();
        let bundle = fixture_bundle(tmp.path());
        std::fs::remove_file(bundle.artifact_path(ArtifactKind::ApplicationImage)).unwrap();
        let registry = RecordingRegistry::new();

        let err = publish(
            &registry,
            &bundle,
            &target(true),
            &credentials(),
            &fast_options(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::IncompleteBundle(_)));
        assert_eq!(registry.upload_attempts(), 0);
    }
}
