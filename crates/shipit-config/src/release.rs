//! Release configuration parsing.
//!
//! A release file describes one buildable board, where bundles land, how to
//! reach the device-management service, and the ordered deployment catalog:
//!
//! ```kdl
//! release "frog-sensor"
//!
//! board "esp32-frog"
//! manifest "manifest.py"
//! bundle-root "dist"
//!
//! build {
//!     program "make"
//!     arg "-C" "firmware"
//!     boards-dir "firmware/boards"
//!     output-dir "firmware/build"
//! }
//!
//! registry {
//!     url "https://api.golioth.io"
//!     package "main"
//!     timeout-secs 30
//!     retry max-attempts=4 base-delay-ms=500
//! }
//!
//! target "beta" branch="main" project="frog-fleet" blueprint="bp-beta" rollout=#true
//! target "production" tag-prefix="v" project="frog-fleet" blueprint="bp-prod" rollout=#false
//! ```

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use shipit_core::registry::RetryPolicy;
use shipit_core::target::{DeploymentTarget, RefPattern, TargetCatalog};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// How to invoke the external firmware toolchain.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Program to run, e.g. `make`.
    pub program: String,
    /// Leading arguments, before the board and manifest assignments.
    pub args: Vec<String>,
    /// Directory to run the toolchain in.
    pub working_dir: Option<PathBuf>,
    /// Directory holding one sub-directory per known board.
    pub boards_dir: PathBuf,
    /// Directory the toolchain writes its outputs to.
    pub output_dir: PathBuf,
}

/// Settings for the remote firmware registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub base_url: Url,
    /// Remote package name artifacts are filed under.
    pub package: String,
    /// Per-request timeout for registry calls.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// A parsed release file.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub name: String,
    pub board: String,
    pub manifest: PathBuf,
    /// Bundles land under this directory, namespaced by run id.
    pub bundle_root: PathBuf,
    pub build: BuildSettings,
    pub registry: RegistrySettings,
    pub catalog: TargetCatalog,
}

/// Read and parse a release file from disk.
pub fn load_release(path: &Path) -> ConfigResult<ReleaseConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_release(&text)
}

/// Parse a release configuration from KDL text.
pub fn parse_release(kdl: &str) -> ConfigResult<ReleaseConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut board = String::new();
    let mut manifest = None;
    let mut bundle_root = PathBuf::from("dist");
    let mut build = None;
    let mut registry = None;
    let mut catalog = TargetCatalog::new();

    for node in doc.nodes() {
        match node.name().value() {
            "release" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("release name".to_string()))?;
            }
            "board" => {
                board = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("board".to_string()))?;
            }
            "manifest" => {
                manifest = get_first_string_arg(node).map(PathBuf::from);
            }
            "bundle-root" => {
                if let Some(dir) = get_first_string_arg(node) {
                    bundle_root = PathBuf::from(dir);
                }
            }
            "build" => {
                build = Some(parse_build(node)?);
            }
            "registry" => {
                registry = Some(parse_registry(node)?);
            }
            "target" => {
                let (pattern, target) = parse_target(node)?;
                catalog.push(pattern, target);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("release name".to_string()));
    }
    if board.is_empty() {
        return Err(ConfigError::MissingField("board".to_string()));
    }
    let manifest = manifest.ok_or_else(|| ConfigError::MissingField("manifest".to_string()))?;
    let build = build.ok_or_else(|| ConfigError::MissingField("build".to_string()))?;
    let registry = registry.ok_or_else(|| ConfigError::MissingField("registry".to_string()))?;
    if catalog.is_empty() {
        return Err(ConfigError::MissingField("target".to_string()));
    }

    Ok(ReleaseConfig {
        name,
        board,
        manifest,
        bundle_root,
        build,
        registry,
        catalog,
    })
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildSettings> {
    let mut program = String::new();
    let mut args = Vec::new();
    let mut working_dir = None;
    let mut boards_dir = PathBuf::from("boards");
    let mut output_dir = PathBuf::from("build");

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "program" => {
                    program = get_first_string_arg(child).unwrap_or_default();
                }
                "arg" => {
                    args.extend(get_all_string_args(child));
                }
                "working-dir" => {
                    working_dir = get_first_string_arg(child).map(PathBuf::from);
                }
                "boards-dir" => {
                    if let Some(dir) = get_first_string_arg(child) {
                        boards_dir = PathBuf::from(dir);
                    }
                }
                "output-dir" => {
                    if let Some(dir) = get_first_string_arg(child) {
                        output_dir = PathBuf::from(dir);
                    }
                }
                _ => {}
            }
        }
    }

    if program.is_empty() {
        return Err(ConfigError::MissingField("build program".to_string()));
    }

    Ok(BuildSettings {
        program,
        args,
        working_dir,
        boards_dir,
        output_dir,
    })
}

fn parse_registry(node: &KdlNode) -> ConfigResult<RegistrySettings> {
    let mut url = None;
    let mut package = "main".to_string();
    let mut timeout = Duration::from_secs(30);
    let mut retry = RetryPolicy::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "url" => {
                    url = get_first_string_arg(child);
                }
                "package" => {
                    if let Some(pkg) = get_first_string_arg(child) {
                        package = pkg;
                    }
                }
                "timeout-secs" => {
                    if let Some(secs) = get_first_integer_arg(child) {
                        let secs = u64::try_from(secs).map_err(|_| ConfigError::InvalidValue {
                            field: "timeout-secs".to_string(),
                            message: format!("{} is not a valid timeout", secs),
                        })?;
                        timeout = Duration::from_secs(secs);
                    }
                }
                "retry" => {
                    if let Some(attempts) = get_integer_prop(child, "max-attempts") {
                        let attempts =
                            u32::try_from(attempts).ok().filter(|a| *a >= 1).ok_or_else(|| {
                                ConfigError::InvalidValue {
                                    field: "retry max-attempts".to_string(),
                                    message: format!("{} must be a positive integer", attempts),
                                }
                            })?;
                        retry.max_attempts = attempts;
                    }
                    if let Some(ms) = get_integer_prop(child, "base-delay-ms") {
                        let ms = u64::try_from(ms).map_err(|_| ConfigError::InvalidValue {
                            field: "retry base-delay-ms".to_string(),
                            message: format!("{} is not a valid delay", ms),
                        })?;
                        retry.base_delay = Duration::from_millis(ms);
                    }
                }
                _ => {}
            }
        }
    }

    let url = url.ok_or_else(|| ConfigError::MissingField("registry url".to_string()))?;
    let base_url = Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
        field: "registry url".to_string(),
        message: e.to_string(),
    })?;

    Ok(RegistrySettings {
        base_url,
        package,
        timeout,
        retry,
    })
}

fn parse_target(node: &KdlNode) -> ConfigResult<(RefPattern, DeploymentTarget)> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("target name".to_string()))?;

    let branch = get_string_prop(node, "branch");
    let tag_prefix = get_string_prop(node, "tag-prefix");
    let pattern = match (branch, tag_prefix) {
        (Some(branch), None) => RefPattern::Branch(branch),
        (None, Some(prefix)) => RefPattern::TagPrefix(prefix),
        _ => {
            return Err(ConfigError::InvalidValue {
                field: format!("target '{}'", name),
                message: "exactly one of branch= or tag-prefix= is required".to_string(),
            });
        }
    };

    let project = get_string_prop(node, "project")
        .ok_or_else(|| ConfigError::MissingField(format!("project for target '{}'", name)))?;
    let blueprint = get_string_prop(node, "blueprint")
        .ok_or_else(|| ConfigError::MissingField(format!("blueprint for target '{}'", name)))?;
    let rollout = get_bool_prop(node, "rollout").unwrap_or(false);

    Ok((
        pattern,
        DeploymentTarget {
            name,
            project,
            blueprint,
            rollout,
        },
    ))
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

fn get_integer_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}
