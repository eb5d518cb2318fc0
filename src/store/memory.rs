use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{ScalarStore, StateStore};
use crate::error::StoreError;
use crate::instance::{InstanceId, InstanceState};

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<InstanceId, InstanceState>,
    last_id: Option<InstanceId>,
    live_count: usize,
}

/// In-process store.
///
/// Writes can be made to fail on demand, which is how the failure paths of
/// the allocator and persister are exercised without touching a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_records: AtomicBool,
    fail_scalars: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_scalars(&self, fail: bool) {
        self.fail_scalars.store(fail, Ordering::SeqCst);
    }

    pub fn record(&self, id: InstanceId) -> Option<InstanceState> {
        self.tables.lock().records.get(&id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.tables.lock().records.len()
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store write refused".into()))
        } else {
            Ok(())
        }
    }
}

impl StateStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<InstanceState>, StoreError> {
        Ok(self.tables.lock().records.values().cloned().collect())
    }

    fn save(&self, state: &InstanceState) -> Result<(), StoreError> {
        Self::check(&self.fail_records)?;
        self.tables
            .lock()
            .records
            .insert(state.instance_id, state.clone());
        Ok(())
    }

    fn delete(&self, id: InstanceId) -> Result<(), StoreError> {
        Self::check(&self.fail_records)?;
        self.tables.lock().records.remove(&id);
        Ok(())
    }
}

impl ScalarStore for MemoryStore {
    fn load_last_id(&self) -> Result<Option<InstanceId>, StoreError> {
        Ok(self.tables.lock().last_id)
    }

    fn store_last_id(&self, id: InstanceId) -> Result<(), StoreError> {
        Self::check(&self.fail_scalars)?;
        self.tables.lock().last_id = Some(id);
        Ok(())
    }

    fn load_live_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.lock().live_count)
    }

    fn store_live_count(&self, count: usize) -> Result<(), StoreError> {
        Self::check(&self.fail_scalars)?;
        self.tables.lock().live_count = count;
        Ok(())
    }
}
