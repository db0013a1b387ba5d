//! Core domain types and traits for the ShipIt firmware release pipeline.
//!
//! This crate contains:
//! - Run identifiers and build specifications
//! - Artifact kinds, artifact sets, and release bundles
//! - Deployment targets and the ref-to-target resolver
//! - The remote firmware registry boundary (trait, credentials, retry policy)
//! - The error taxonomy shared across the pipeline

pub mod artifact;
pub mod bundle;
pub mod error;
pub mod id;
pub mod registry;
pub mod target;

pub use error::{BuildError, BundleError, UploadError};
pub use id::RunId;
