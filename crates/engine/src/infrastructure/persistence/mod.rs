//! World store adapters
//!
//! - [`MemoryWorldStore`] keeps the world in process; tests and throwaway runs
//! - [`SqliteWorldStore`] persists to a SQLite file via `sqlx`

mod memory_store;
mod sqlite_store;

pub use memory_store::{MemoryWorldStore, World};
pub use sqlite_store::SqliteWorldStore;
