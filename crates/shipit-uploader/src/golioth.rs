//! Golioth-compatible device-management API client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use shipit_core::error::UploadError;
use shipit_core::registry::{
    ArtifactUpload, Credentials, FirmwareRegistry, ReleaseRequest, RemoteArtifact, RemoteRelease,
};

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for a Golioth-style device-management API.
pub struct GoliothClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GoliothClient {
    /// Create a client with an explicit per-request timeout; no call may
    /// block past it.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, UploadError> {
        self.base_url
            .join(path)
            .map_err(|e| UploadError::Transport(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ArtifactData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseData {
    id: String,
}

fn transport(e: reqwest::Error) -> UploadError {
    UploadError::Transport(e.to_string())
}

/// Map a non-success HTTP response into the error taxonomy: 401/403 are
/// credential problems, 5xx are transient transport failures, anything
/// else is a server rejection.
async fn into_api_error(response: reqwest::Response) -> UploadError {
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        UploadError::Auth(format!("registry returned {}: {}", status, detail))
    } else if status.is_server_error() {
        UploadError::Transport(format!("registry returned {}: {}", status, detail))
    } else {
        UploadError::ServerRejected {
            status: status.as_u16(),
            detail,
        }
    }
}

#[async_trait]
impl FirmwareRegistry for GoliothClient {
    async fn upload_artifact(
        &self,
        credentials: &Credentials,
        upload: ArtifactUpload,
    ) -> Result<RemoteArtifact, UploadError> {
        let url = self.endpoint("v1/artifacts")?;
        debug!(kind = %upload.kind, version = %upload.version, "Uploading artifact");

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[
                ("projectId", upload.project.as_str()),
                ("blueprintId", upload.blueprint.as_str()),
                ("package", upload.package.as_str()),
                ("version", upload.version.as_str()),
            ])
            .body(upload.content)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(into_api_error(response).await);
        }
        let envelope: Envelope<ArtifactData> = response.json().await.map_err(transport)?;
        Ok(RemoteArtifact {
            id: envelope.data.id,
        })
    }

    async fn create_release(
        &self,
        credentials: &Credentials,
        request: ReleaseRequest,
    ) -> Result<RemoteRelease, UploadError> {
        let url = self.endpoint(&format!("v1/projects/{}/releases", request.project))?;
        debug!(blueprint = %request.blueprint, rollout = request.rollout, "Creating release");

        let body = serde_json::json!({
            "blueprintId": request.blueprint,
            "artifactIds": request.artifact_ids,
            "rollout": request.rollout,
        });
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(into_api_error(response).await);
        }
        let envelope: Envelope<ReleaseData> = response.json().await.map_err(transport)?;
        Ok(RemoteRelease {
            id: envelope.data.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_against_the_base_url() {
        let client = GoliothClient::new(
            Url::parse("https://api.golioth.io").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            client.endpoint("v1/artifacts").unwrap().as_str(),
            "https://api.golioth.io/v1/artifacts"
        );
        assert_eq!(
            client
                .endpoint("v1/projects/frog-fleet/releases")
                .unwrap()
                .as_str(),
            "https://api.golioth.io/v1/projects/frog-fleet/releases"
        );
    }
}
