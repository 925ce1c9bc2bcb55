//! service-core: shared infrastructure for the AAA workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
