//! Release publication for the ShipIt firmware pipeline.
//!
//! Provides the Golioth-compatible registry client and the publish workflow:
//! artifact uploads with bounded retry, then a single, never-retried release
//! creation that may trigger a fleet rollout.

pub mod golioth;
pub mod publish;

pub use golioth::GoliothClient;
pub use publish::{PublishOptions, publish};
