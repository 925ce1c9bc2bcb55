//! External collaborators exposed as traits — persistence and the transport
//! cache are owned by the caller; this crate ships only in-memory reference
//! adapters for tests and local wiring.
pub mod cache;
pub mod repository;

pub use cache::{CachePort, InMemoryCache};
pub use repository::*;
