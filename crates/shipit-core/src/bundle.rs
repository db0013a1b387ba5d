//! Release bundles: an immutable directory of artifacts plus a manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::artifact::ArtifactKind;
use crate::error::BundleError;

/// Filename of the bundle manifest. A directory without one is not a
/// publishable bundle.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Version metadata stamped into a bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Human-facing release version (typically `git describe` output).
    pub version: String,
    /// Source commit the artifacts were built from.
    pub commit_id: String,
    /// UTC build timestamp.
    pub build_date: DateTime<Utc>,
}

/// One artifact as recorded in the bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    /// Filename relative to the bundle directory.
    pub file: String,
    pub size: u64,
    pub sha256: String,
}

/// Contents of `manifest.json` at the bundle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: VersionInfo,
    pub artifacts: Vec<ArtifactEntry>,
}

impl BundleManifest {
    pub fn entry(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|entry| entry.kind == kind)
    }
}

/// A complete release bundle on disk. Never mutated after creation; the
/// uploader only reads it.
#[derive(Debug, Clone)]
pub struct ReleaseBundle {
    dir: PathBuf,
    manifest: BundleManifest,
}

impl ReleaseBundle {
    /// Wrap a directory and manifest that were just written by the bundler.
    pub fn new(dir: PathBuf, manifest: BundleManifest) -> Self {
        Self { dir, manifest }
    }

    /// Re-open an existing bundle, verifying that every artifact the
    /// manifest lists is present with its recorded size.
    pub fn load(dir: &Path) -> Result<Self, BundleError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(BundleError::MissingManifest(dir.to_path_buf()));
        }
        let data = std::fs::read(&manifest_path)?;
        let manifest: BundleManifest = serde_json::from_slice(&data)?;
        let bundle = Self {
            dir: dir.to_path_buf(),
            manifest,
        };
        bundle.verify()?;
        Ok(bundle)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn version(&self) -> &VersionInfo {
        &self.manifest.version
    }

    /// Location of one artifact inside the bundle.
    pub fn artifact_path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.bundle_file_name())
    }

    /// Check that every artifact kind has a manifest entry and that each
    /// listed file exists with the recorded size.
    pub fn verify(&self) -> Result<(), BundleError> {
        for kind in ArtifactKind::ALL {
            let entry = self
                .manifest
                .entry(kind)
                .ok_or(BundleError::IncompleteSet(kind))?;
            let path = self.dir.join(&entry.file);
            let metadata = std::fs::metadata(&path)
                .map_err(|_| BundleError::MissingArtifactFile {
                    kind,
                    path: path.clone(),
                })?;
            if metadata.len() != entry.size {
                return Err(BundleError::SizeMismatch {
                    kind,
                    expected: entry.size,
                    actual: metadata.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_directory_without_manifest() {
        let dir = tempfile::tempdir().unwrap();

        let err = ReleaseBundle::load(dir.path()).unwrap_err();
        assert!(matches!(err, BundleError::MissingManifest(_)));
    }

    #[test]
    fn manifest_entry_lookup_by_kind() {
        let manifest = BundleManifest {
            version: VersionInfo {
                version: "v1.0.0".to_string(),
                commit_id: "abc123".to_string(),
                build_date: Utc::now(),
            },
            artifacts: vec![ArtifactEntry {
                kind: ArtifactKind::Bootloader,
                file: "bootloader.bin".to_string(),
                size: 16,
                sha256: "00".to_string(),
            }],
        };

        assert!(manifest.entry(ArtifactKind::Bootloader).is_some());
        assert!(manifest.entry(ArtifactKind::ApplicationImage).is_none());
    }
}
