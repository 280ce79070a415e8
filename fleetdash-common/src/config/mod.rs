//! Configuration primitives for fleetdash.
//!
//! - Environment variable parsing with type safety and error collection
//! - Source tracking so startup logs can say where each value came from

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
