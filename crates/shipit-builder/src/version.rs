//! Release version stamping from the source tree.

use chrono::Utc;
use std::path::Path;
use tokio::process::Command;

use shipit_core::bundle::VersionInfo;
use shipit_core::error::BuildError;

/// Derive version metadata from git: `git describe` for the human-facing
/// version, `git rev-parse HEAD` for the exact commit.
pub async fn version_from_git(repo_dir: &Path) -> Result<VersionInfo, BuildError> {
    let version = git_output(repo_dir, &["describe"]).await?;
    let commit_id = git_output(repo_dir, &["rev-parse", "HEAD"]).await?;
    Ok(VersionInfo {
        version,
        commit_id,
        build_date: Utc::now(),
    })
}

async fn git_output(repo_dir: &Path, args: &[&str]) -> Result<String, BuildError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| BuildError::Spawn {
            program: "git".to_string(),
            source: e,
        })?;
    if !output.status.success() {
        return Err(BuildError::Toolchain {
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_from_a_non_repo_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();

        let result = version_from_git(tmp.path()).await;
        assert!(result.is_err());
    }
}
