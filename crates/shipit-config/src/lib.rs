//! KDL configuration parsing for the ShipIt firmware pipeline.
//!
//! This crate handles parsing of the release file (`release.kdl`): the
//! buildable board, toolchain invocation, bundle destination, registry
//! settings, and the ordered deployment catalog.

pub mod error;
pub mod release;

pub use error::{ConfigError, ConfigResult};
pub use release::{BuildSettings, RegistrySettings, ReleaseConfig, load_release, parse_release};
