//! Bounded pool of channel ids.
//!
//! A channel id names one live endpoint inside the process and matches the
//! width of the protocol's per-stream parser state. Ids are handed out
//! lowest-first and go back to the pool exactly once, when the owning
//! [`ChannelLease`] is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Number of channel ids available per process.
pub const MAX_CHANNELS: usize = 16;

/// A channel id in `0..MAX_CHANNELS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks which channel ids are in use.
///
/// Allocation and release may come from any thread: connections are built on
/// caller threads and torn down from reactor or reader threads.
#[derive(Debug)]
pub struct ChannelRegistry {
    allocated: Mutex<[bool; MAX_CHANNELS]>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            allocated: Mutex::new([false; MAX_CHANNELS]),
        }
    }

    /// The process-wide registry used by [`crate::open`].
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ChannelRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Reserve the lowest free id.
    pub fn allocate(&self) -> Result<ChannelId> {
        let mut slots = self.slots();
        match slots.iter().position(|used| !used) {
            Some(index) => {
                slots[index] = true;
                let id = ChannelId(index as u8);
                debug!(channel = %id, "allocated channel");
                Ok(id)
            }
            None => {
                error!(max = MAX_CHANNELS, "channel pool exhausted");
                Err(Error::ResourceExhausted { max: MAX_CHANNELS })
            }
        }
    }

    /// Return `id` to the pool.
    ///
    /// Returns `false` (and logs) if `id` was not allocated; that is a caller bug.
    pub fn release(&self, id: ChannelId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(id.index()) else {
            warn!(channel = %id, "release of out-of-range channel");
            return false;
        };
        if !*slot {
            warn!(channel = %id, "release of unallocated channel");
            return false;
        }
        *slot = false;
        debug!(channel = %id, "freed channel");
        true
    }

    /// Number of free ids.
    pub fn available(&self) -> usize {
        self.slots().iter().filter(|used| !**used).count()
    }

    pub fn is_allocated(&self, id: ChannelId) -> bool {
        self.slots().get(id.index()).copied().unwrap_or(false)
    }

    /// Reserve the lowest free id, tied to a guard that releases it on drop.
    pub fn lease(self: &Arc<Self>) -> Result<ChannelLease> {
        let id = self.allocate()?;
        Ok(ChannelLease {
            id,
            registry: Arc::clone(self),
        })
    }

    fn slots(&self) -> MutexGuard<'_, [bool; MAX_CHANNELS]> {
        self.allocated.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of one channel id. Dropping the lease releases the id.
#[derive(Debug)]
pub struct ChannelLease {
    id: ChannelId,
    registry: Arc<ChannelRegistry>,
}

impl ChannelLease {
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn allocates_lowest_free_id() {
        let registry = ChannelRegistry::new();
        let ids: Vec<u8> = (0..3).map(|_| registry.allocate().unwrap().get()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(registry.available(), MAX_CHANNELS - 3);
    }

    #[test]
    fn exhaustion_then_reuse_lowest() {
        let registry = ChannelRegistry::new();
        let ids: Vec<ChannelId> = (0..MAX_CHANNELS)
            .map(|_| registry.allocate().unwrap())
            .collect();
        assert_eq!(registry.available(), 0);

        let err = registry.allocate().unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { max: MAX_CHANNELS }));

        assert!(registry.release(ids[9]));
        assert!(registry.release(ids[4]));
        assert_eq!(registry.allocate().unwrap().get(), 4);
        assert_eq!(registry.allocate().unwrap().get(), 9);
    }

    #[test]
    fn release_unallocated_is_rejected() {
        let registry = ChannelRegistry::new();
        let id = registry.allocate().unwrap();
        assert!(registry.release(id));
        assert!(!registry.release(id));
        assert_eq!(registry.available(), MAX_CHANNELS);
    }

    #[test]
    fn lease_releases_on_drop() {
        let registry = Arc::new(ChannelRegistry::new());
        let lease = registry.lease().unwrap();
        let id = lease.id();
        assert!(registry.is_allocated(id));

        drop(lease);
        assert!(!registry.is_allocated(id));
        assert_eq!(registry.available(), MAX_CHANNELS);
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let registry = Arc::new(ChannelRegistry::new());
        let handles: Vec<_> = (0..MAX_CHANNELS + 4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.allocate().ok())
            })
            .collect();

        let granted: Vec<ChannelId> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<ChannelId> = granted.iter().copied().collect();

        assert_eq!(granted.len(), MAX_CHANNELS);
        assert_eq!(unique.len(), MAX_CHANNELS);
        assert_eq!(registry.available(), 0);
    }

    #[test]
    fn concurrent_churn_never_exceeds_capacity() {
        let registry = Arc::new(ChannelRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..500 {
                        if let Ok(lease) = registry.lease() {
                            assert!(registry.is_allocated(lease.id()));
                            assert!(registry.available() < MAX_CHANNELS);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.available(), MAX_CHANNELS);
    }
}
