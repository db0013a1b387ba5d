//! The release pipeline: build, bundle, resolve, publish.

use anyhow::Result;
use std::path::Path;
use tracing::{error, info};

use shipit_builder::{FirmwareBuilder, ToolchainConfig, version_from_git};
use shipit_config::{ReleaseConfig, load_release};
use shipit_core::RunId;
use shipit_core::artifact::{ArtifactSet, BuildSpec};
use shipit_core::bundle::{ReleaseBundle, VersionInfo};
use shipit_core::error::BuildError;
use shipit_core::registry::Credentials;
use shipit_uploader::{GoliothClient, PublishOptions, publish};

use super::{EXIT_BUILD, EXIT_UPLOAD};

/// Full pipeline run. Exits non-zero on build, bundle, or publish failure;
/// a ref that resolves to no deployment target skips the upload and exits
/// zero.
pub async fn run(config_path: &Path, ref_name: &str, version: Option<String>) -> Result<()> {
    let config = load_release(config_path)?;

    let bundle = match run_bundle(&config, version).await {
        Ok(bundle) => bundle,
        Err(e) => {
            error!(error = %e, "Pipeline aborted before publish");
            std::process::exit(EXIT_BUILD);
        }
    };

    let Some(target) = config.catalog.resolve(ref_name) else {
        info!(ref_name, "No deployment target for this ref, skipping upload");
        println!("{} matches no deployment target; nothing published", ref_name);
        return Ok(());
    };

    let Some(credentials) = Credentials::from_env() else {
        error!("SHIPIT_API_KEY / SHIPIT_PROJECT are not set");
        std::process::exit(EXIT_UPLOAD);
    };

    let registry = match GoliothClient::new(config.registry.base_url.clone(), config.registry.timeout)
    {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to construct registry client");
            std::process::exit(EXIT_UPLOAD);
        }
    };
    let options = PublishOptions {
        package: config.registry.package.clone(),
        retry: config.registry.retry.clone(),
    };

    match publish(&registry, &bundle, target, &credentials, &options).await {
        Ok(result) => {
            println!(
                "Published {} to {} (release {})",
                result.version, result.target.name, result.release_id
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Publish failed");
            std::process::exit(EXIT_UPLOAD);
        }
    }
}

pub async fn build(config_path: &Path) -> Result<()> {
    let config = load_release(config_path)?;
    match run_build(&config).await {
        Ok(set) => {
            println!("Built {} artifacts in {}", set.len(), config.build.output_dir.display());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Build failed");
            std::process::exit(EXIT_BUILD);
        }
    }
}

pub async fn bundle(config_path: &Path, version: Option<String>) -> Result<()> {
    let config = load_release(config_path)?;
    match run_bundle(&config, version).await {
        Ok(bundle) => {
            println!(
                "Bundle {} written to {}",
                bundle.version().version,
                bundle.dir().display()
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Bundling failed");
            std::process::exit(EXIT_BUILD);
        }
    }
}

fn build_spec(config: &ReleaseConfig) -> BuildSpec {
    BuildSpec {
        board: config.board.clone(),
        manifest: config.manifest.clone(),
        output_dir: config.build.output_dir.clone(),
    }
}

async fn run_build(config: &ReleaseConfig) -> Result<ArtifactSet, BuildError> {
    let builder = FirmwareBuilder::new(ToolchainConfig {
        program: config.build.program.clone(),
        args: config.build.args.clone(),
        working_dir: config.build.working_dir.clone(),
        boards_dir: config.build.boards_dir.clone(),
    });
    builder.build(&build_spec(config)).await
}

async fn run_bundle(config: &ReleaseConfig, version: Option<String>) -> Result<ReleaseBundle> {
    let set = run_build(config).await?;
    let version = stamp_version(version).await?;
    // Each run bundles into its own directory so concurrent CI jobs never
    // share a destination.
    let destination = config.bundle_root.join(RunId::new().to_string());
    let bundle = shipit_builder::bundle(&set, &version, &destination)?;
    Ok(bundle)
}

/// Version metadata for this run: `git describe` output, with an optional
/// explicit override of the version string.
async fn stamp_version(override_version: Option<String>) -> Result<VersionInfo, BuildError> {
    match version_from_git(Path::new(".")).await {
        Ok(mut info) => {
            if let Some(version) = override_version {
                info.version = version;
            }
            Ok(info)
        }
        Err(e) => match override_version {
            Some(version) => Ok(VersionInfo {
                version,
                commit_id: "unknown".to_string(),
                build_date: chrono::Utc::now(),
            }),
            None => Err(e),
        },
    }
}
