//! Types library for the telemetry ingestion engine
//!
//! Shared vocabulary used by the ingestion service and its consumers,
//! kept in its own crate so that the series format and the error
//! taxonomy stay identical on both sides of the visualization boundary.
//!
//! # Modules
//! - `ids`: Channel identifiers
//! - `sample`: Timestamped observations
//! - `time`: Canonical timestamp handling (fixed reference offset)
//! - `errors`: Error taxonomy

pub mod ids;
pub mod sample;
pub mod time;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::sample::*;
    pub use crate::time::*;
}
