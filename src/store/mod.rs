//! Persistence store abstraction

mod file;
mod memory;
mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{PersistenceStore, StoreError};
