pub mod failure_store;
pub mod file_store;
pub mod memory_store;

pub use failure_store::*;
pub use file_store::*;
pub use memory_store::*;

use crate::error::Result;

/// Persistent string key-value storage that survives a restart.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}
