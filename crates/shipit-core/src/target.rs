//! Deployment targets and the ref-to-target resolver.

use serde::{Deserialize, Serialize};

/// Where a release goes: one fleet blueprint plus its rollout policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Catalog name, e.g. "beta" or "production".
    pub name: String,
    /// Fleet project the devices are enrolled under.
    pub project: String,
    /// Blueprint grouping the devices that should receive this firmware line.
    pub blueprint: String,
    /// Whether the service pushes the release to enrolled devices as soon
    /// as it is published. When false the release waits for manual promotion.
    pub rollout: bool,
}

/// A pattern matched against the triggering source-control ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefPattern {
    /// Matches exactly one branch name.
    Branch(String),
    /// Matches any ref starting with the prefix, e.g. "v" for version tags.
    TagPrefix(String),
}

impl RefPattern {
    pub fn matches(&self, ref_name: &str) -> bool {
        match self {
            RefPattern::Branch(branch) => ref_name == branch,
            RefPattern::TagPrefix(prefix) => ref_name.starts_with(prefix.as_str()),
        }
    }
}

/// Ordered catalog of deployment targets.
///
/// Catalog order is authoritative: the first pattern matching a ref decides
/// where the release goes, so overlapping patterns resolve deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetCatalog {
    entries: Vec<(RefPattern, DeploymentTarget)>,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pattern: RefPattern, target: DeploymentTarget) {
        self.entries.push((pattern, target));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(RefPattern, DeploymentTarget)> {
        self.entries.iter()
    }

    /// First matching target, or `None` when the ref is ordinary
    /// feature-branch activity that ships nowhere. No match is a normal
    /// outcome, not an error.
    pub fn resolve(&self, ref_name: &str) -> Option<&DeploymentTarget> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(ref_name))
            .map(|(_, target)| target)
    }

    /// The two documented defaults: the default branch ships to the beta
    /// blueprint with automatic rollout; version tags ship to production
    /// with rollout left for manual promotion.
    pub fn defaults(project: &str, beta_blueprint: &str, production_blueprint: &str) -> Self {
        let mut catalog = Self::new();
        catalog.push(
            RefPattern::Branch("main".to_string()),
            DeploymentTarget {
                name: "beta".to_string(),
                project: project.to_string(),
                blueprint: beta_blueprint.to_string(),
                rollout: true,
            },
        );
        catalog.push(
            RefPattern::TagPrefix("v".to_string()),
            DeploymentTarget {
                name: "production".to_string(),
                project: project.to_string(),
                blueprint: production_blueprint.to_string(),
                rollout: false,
            },
        );
        catalog
    }
}
