use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{OverlayError, StoreError};
use crate::instance::InstanceId;
use crate::store::ScalarStore;

/// Issues strictly increasing instance ids.
///
/// The high-water mark is written through to the scalar store before an id is
/// handed out, so an id is never reissued even if the process dies before the
/// caller persists the new record.
pub struct IdentityAllocator {
    scalars: Arc<dyn ScalarStore>,
    last: Mutex<Option<InstanceId>>,
}

impl std::fmt::Debug for IdentityAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityAllocator")
            .field("last", &*self.last.lock())
            .finish()
    }
}

impl IdentityAllocator {
    /// Load the last issued id from `scalars`.
    pub fn load(scalars: Arc<dyn ScalarStore>) -> Result<Self, StoreError> {
        let last = scalars.load_last_id()?;
        Ok(Self {
            scalars,
            last: Mutex::new(last),
        })
    }

    pub fn last_issued(&self) -> Option<InstanceId> {
        *self.last.lock()
    }

    /// Hand out the id after the highest one issued so far, counting ids
    /// other processes sharing the store have issued since `load`.
    pub fn next(&self) -> Result<InstanceId, OverlayError> {
        let mut last = self.last.lock();
        let stored = self.scalars.load_last_id()?;
        let base = (*last).max(stored);
        let candidate = base.map_or_else(InstanceId::first, InstanceId::successor);
        self.scalars.store_last_id(candidate).map_err(|err| {
            tracing::error!(candidate = %candidate, error = %err, "could not record id high-water mark");
            OverlayError::Persistence(err)
        })?;
        *last = Some(candidate);
        Ok(candidate)
    }

    /// Advance to at least the largest of `ids`. Never moves backwards.
    pub fn restore_high_water_mark(&self, ids: &[InstanceId]) {
        let Some(max) = ids.iter().copied().max() else {
            return;
        };
        let mut last = self.last.lock();
        if last.is_some_and(|current| current >= max) {
            return;
        }
        *last = Some(max);
        if let Err(err) = self.scalars.store_last_id(max) {
            // The in-memory mark still protects this session; the next
            // successful `next()` rewrites a higher value anyway.
            tracing::warn!(mark = %max, error = %err, "could not persist restored high-water mark");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn id(raw: u64) -> InstanceId {
        InstanceId::new(raw).unwrap()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let store = Arc::new(MemoryStore::new());
        let alloc = IdentityAllocator::load(store.clone()).unwrap();
        assert_eq!(alloc.next().unwrap(), id(1));
        assert_eq!(alloc.next().unwrap(), id(2));
        assert_eq!(store.load_last_id().unwrap(), Some(id(2)));
    }

    #[test]
    fn fresh_allocator_continues_after_reload() {
        let store = Arc::new(MemoryStore::new());
        IdentityAllocator::load(store.clone()).unwrap().next().unwrap();
        let again = IdentityAllocator::load(store).unwrap();
        assert_eq!(again.next().unwrap(), id(2));
    }

    #[test]
    fn failed_write_hands_out_nothing() {
        let store = Arc::new(MemoryStore::new());
        let alloc = IdentityAllocator::load(store.clone()).unwrap();
        alloc.next().unwrap();
        store.set_fail_scalars(true);
        assert!(matches!(alloc.next(), Err(OverlayError::Persistence(_))));
        assert_eq!(alloc.last_issued(), Some(id(1)));
        store.set_fail_scalars(false);
        assert_eq!(alloc.next().unwrap(), id(2));
    }

    #[test]
    fn allocators_sharing_a_store_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let host = IdentityAllocator::load(store.clone()).unwrap();
        let cli = IdentityAllocator::load(store.clone()).unwrap();
        assert_eq!(host.next().unwrap(), id(1));
        assert_eq!(cli.next().unwrap(), id(2));
        assert_eq!(host.next().unwrap(), id(3));
        assert_eq!(store.load_last_id().unwrap(), Some(id(3)));
    }

    #[test]
    fn restore_only_moves_forward() {
        let store = Arc::new(MemoryStore::new());
        let alloc = IdentityAllocator::load(store).unwrap();
        alloc.restore_high_water_mark(&[id(3), id(7), id(5)]);
        assert_eq!(alloc.last_issued(), Some(id(7)));
        alloc.restore_high_water_mark(&[id(2)]);
        assert_eq!(alloc.next().unwrap(), id(8));
    }
}
