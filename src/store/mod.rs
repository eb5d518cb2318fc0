//! Durable storage seams.
//!
//! Records and scalars are split into two traits so embedders can keep the
//! cheap scalars (last issued id, live count) somewhere faster than the
//! record table. Both must be callable from any thread.

mod json;
mod memory;
mod persister;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use persister::{PersistHandle, Persister};

use crate::error::StoreError;
use crate::instance::{InstanceId, InstanceState};

/// One persisted record per instance id.
pub trait StateStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<InstanceState>, StoreError>;
    fn save(&self, state: &InstanceState) -> Result<(), StoreError>;
    /// Deleting a record that does not exist is not an error.
    fn delete(&self, id: InstanceId) -> Result<(), StoreError>;
}

/// Small durable values kept next to the record table.
pub trait ScalarStore: Send + Sync {
    fn load_last_id(&self) -> Result<Option<InstanceId>, StoreError>;
    fn store_last_id(&self, id: InstanceId) -> Result<(), StoreError>;
    fn load_live_count(&self) -> Result<usize, StoreError>;
    fn store_live_count(&self, count: usize) -> Result<(), StoreError>;
}
