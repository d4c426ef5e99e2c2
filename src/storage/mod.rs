//! Durable key-value storage backends.

pub mod traits;
pub mod memory;
pub mod sql;

pub use traits::{KvStore, StorageError};
pub use memory::InMemoryKvStore;
pub use sql::SqlKvStore;
