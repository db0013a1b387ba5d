//! Assembles a build's artifact set into an immutable release bundle.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::info;

use shipit_core::artifact::{ArtifactKind, ArtifactSet};
use shipit_core::bundle::{
    ArtifactEntry, BundleManifest, MANIFEST_FILE, ReleaseBundle, VersionInfo,
};
use shipit_core::error::BundleError;

/// Copy every artifact into `destination` under its stable logical name and
/// write the bundle manifest.
///
/// Refuses incomplete sets before touching the filesystem, and refuses a
/// destination that already holds a bundle. The manifest is written last,
/// so an interrupted copy never leaves a publishable-looking directory.
pub fn bundle(
    set: &ArtifactSet,
    version: &VersionInfo,
    destination: &Path,
) -> Result<ReleaseBundle, BundleError> {
    if let Some(kind) = set.missing_kind() {
        return Err(BundleError::IncompleteSet(kind));
    }
    let manifest_path = destination.join(MANIFEST_FILE);
    if manifest_path.exists() {
        return Err(BundleError::DestinationExists(destination.to_path_buf()));
    }
    fs::create_dir_all(destination)?;

    let mut artifacts = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        let Some(source) = set.get(kind) else {
            return Err(BundleError::IncompleteSet(kind));
        };
        let content = fs::read(source)?;
        let sha256 = hex::encode(Sha256::digest(&content));
        let file = kind.bundle_file_name();
        fs::write(destination.join(file), &content)?;
        artifacts.push(ArtifactEntry {
            kind,
            file: file.to_string(),
            size: content.len() as u64,
            sha256,
        });
    }

    let manifest = BundleManifest {
        version: version.clone(),
        artifacts,
    };
    fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

    info!(dir = %destination.display(), version = %version.version, "Wrote release bundle");
    Ok(ReleaseBundle::new(destination.to_path_buf(), manifest))
}
