//! Build specifications and firmware artifact sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One buildable board/manifest configuration.
///
/// Immutable once constructed; a fresh spec is created for every pipeline
/// run so no state leaks between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Board identifier. Must name a configuration known to the toolchain.
    pub board: String,
    /// Path to the frozen-module manifest baked into the image.
    pub manifest: PathBuf,
    /// Directory the toolchain writes its outputs to.
    pub output_dir: PathBuf,
}

/// The four logical artifacts a flashable firmware release is made of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Bootloader,
    PartitionTable,
    OtaInitData,
    ApplicationImage,
}

impl ArtifactKind {
    /// All artifact kinds, in flash order.
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Bootloader,
        ArtifactKind::PartitionTable,
        ArtifactKind::OtaInitData,
        ArtifactKind::ApplicationImage,
    ];

    /// Stable logical name, used in manifests and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Bootloader => "bootloader",
            ArtifactKind::PartitionTable => "partition-table",
            ArtifactKind::OtaInitData => "ota-init-data",
            ArtifactKind::ApplicationImage => "application-image",
        }
    }

    /// Filename the artifact is stored under inside a release bundle.
    ///
    /// Downstream consumers (uploader, flashing tooling) depend on these
    /// names, not on the toolchain's internal output layout.
    pub fn bundle_file_name(self) -> &'static str {
        match self {
            ArtifactKind::Bootloader => "bootloader.bin",
            ArtifactKind::PartitionTable => "partition-table.bin",
            ArtifactKind::OtaInitData => "ota-init-data.bin",
            ArtifactKind::ApplicationImage => "application-image.bin",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping from artifact kind to the file the build produced.
///
/// A set is only publishable when all four kinds are present; callers check
/// with [`ArtifactSet::missing_kind`] before bundling.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    entries: BTreeMap<ArtifactKind, PathBuf>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ArtifactKind, path: PathBuf) {
        self.entries.insert(kind, path);
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Path> {
        self.entries.get(&kind).map(PathBuf::as_path)
    }

    /// First artifact kind with no entry, in flash order.
    pub fn missing_kind(&self) -> Option<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| !self.entries.contains_key(kind))
    }

    pub fn is_complete(&self) -> bool {
        self.missing_kind().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &Path)> {
        self.entries.iter().map(|(kind, path)| (*kind, path.as_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_kind_reports_first_gap_in_flash_order() {
        let mut set = ArtifactSet::new();
        set.insert(ArtifactKind::Bootloader, PathBuf::from("boot.bin"));
        set.insert(ArtifactKind::ApplicationImage, PathBuf::from("app.bin"));

        assert_eq!(set.missing_kind(), Some(ArtifactKind::PartitionTable));
        assert!(!set.is_complete());
    }

    #[test]
    fn complete_set_has_no_missing_kind() {
        let mut set = ArtifactSet::new();
        for kind in ArtifactKind::ALL {
            set.insert(kind, PathBuf::from(kind.bundle_file_name()));
        }

        assert_eq!(set.missing_kind(), None);
        assert!(set.is_complete());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn logical_names_are_stable() {
        assert_eq!(ArtifactKind::Bootloader.as_str(), "bootloader");
        assert_eq!(ArtifactKind::PartitionTable.as_str(), "partition-table");
        assert_eq!(ArtifactKind::OtaInitData.as_str(), "ota-init-data");
        assert_eq!(ArtifactKind::ApplicationImage.as_str(), "application-image");
    }
}
