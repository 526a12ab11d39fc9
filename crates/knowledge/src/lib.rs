//! Knowledge store backends for taskforge.
//!
//! - [`InMemoryStore`]: process-local, for tests and one-off sessions
//! - [`SqliteStore`]: the persistent default (`sqlite` feature)
//!
//! [`seed`] fills a fresh store with default formats, environment facts, and
//! tool records imported from the registry.

pub mod in_memory;
mod records;
pub mod seed;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use seed::{SeedReport, bootstrap};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
