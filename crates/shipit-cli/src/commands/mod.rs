//! CLI command implementations.

pub mod run;

use anyhow::Result;
use shipit_config::load_release;
use std::path::Path;

/// Exit code when building or bundling fails.
pub const EXIT_BUILD: i32 = 2;
/// Exit code when publishing fails after exhausting retries.
pub const EXIT_UPLOAD: i32 = 3;

pub fn validate(config_path: &Path) -> Result<()> {
    match load_release(config_path) {
        Ok(config) => {
            println!(
                "Configuration is valid: board '{}', {} deployment targets",
                config.board,
                config.catalog.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn resolve(config_path: &Path, ref_name: &str) -> Result<()> {
    let config = load_release(config_path)?;
    match config.catalog.resolve(ref_name) {
        Some(target) => println!(
            "{} -> {} (blueprint {}, rollout {})",
            ref_name, target.name, target.blueprint, target.rollout
        ),
        None => println!("{} -> no deployment target", ref_name),
    }
    Ok(())
}
