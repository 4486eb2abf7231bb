//! Persistence gateway for Kognia.
//!
//! The orchestrator talks to storage only through the [`JobStore`] trait.
//! Two implementations ship with the crate: [`InMemoryStore`] and, behind the
//! `sqlite` feature, [`SqliteStore`].

/// Process-local store.
pub mod memory;
/// SQLite store.
#[cfg(feature = "sqlite")]
pub mod sqlite;
/// The gateway trait and claim outcome.
pub mod store;

pub use memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::{Claim, JobStore};
