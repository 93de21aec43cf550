//! Bounded LRU over finished DNG artifacts with single-flight builds.
//!
//! Artifacts are immutable once published and shared by reference count: the
//! cache holds one strong reference, every reader another. A lookup for a
//! key that is already building attaches to that build instead of starting a
//! second one; the finishing thread notifies every attached waiter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::vfs::mounts::MountId;

/// Cache key: one mount, one output frame, one settings fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub mount: MountId,
    pub output_index: u32,
    pub fingerprint: u64,
}

/// Callback attached to a pending build; receives the finished artifact or
/// the failure status code.
pub type Waiter = Box<dyn FnOnce(Result<Arc<Vec<u8>>, i32>) + Send>;

/// Outcome of a lookup.
pub enum Lookup {
    /// The artifact is resident; serve it directly.
    Hit(Arc<Vec<u8>>),
    /// Nothing resident and nothing building: the caller owns the build and
    /// must eventually call [`ArtifactCache::complete`].
    Owner,
    /// A build is underway; the waiter was attached to it.
    Attached,
}

struct Resident {
    data: Arc<Vec<u8>>,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    resident: HashMap<FrameKey, Resident>,
    in_flight: HashMap<FrameKey, Vec<Waiter>>,
    bytes: u64,
    tick: u64,
}

pub struct ArtifactCache {
    capacity: u64,
    inner: Mutex<Inner>,
}

impl ArtifactCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity: capacity_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Resident bytes right now.
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().bytes
    }

    /// Look `key` up; on miss either claim the build or attach `waiter` to
    /// the one in progress. On a hit the waiter is returned unused.
    pub fn lookup_or_attach(&self, key: FrameKey, waiter: Waiter) -> (Lookup, Option<Waiter>) {
        let mut inner = self.inner.lock();

        inner.tick += 1;
        let tick = inner.tick;
        if let Some(resident) = inner.resident.get_mut(&key) {
            resident.last_used = tick;
            trace!(?key, "cache hit");
            return (Lookup::Hit(resident.data.clone()), Some(waiter));
        }

        match inner.in_flight.get_mut(&key) {
            Some(waiters) => {
                trace!(?key, "attached to in-flight build");
                waiters.push(waiter);
                (Lookup::Attached, None)
            }
            None => {
                inner.in_flight.insert(key, vec![waiter]);
                (Lookup::Owner, None)
            }
        }
    }

    /// Publish the result of a build claimed via [`Lookup::Owner`] and
    /// return the waiters to notify. Successful artifacts enter the LRU
    /// unless they alone exceed the capacity; failures are never cached.
    #[must_use = "waiters must be invoked by the caller"]
    pub fn complete(&self, key: FrameKey, result: Result<Arc<Vec<u8>>, i32>) -> Vec<Waiter> {
        let mut inner = self.inner.lock();
        let waiters = inner.in_flight.remove(&key).unwrap_or_default();

        if let Ok(data) = &result {
            let size = data.len() as u64;
            if size <= self.capacity {
                Self::evict_for(&mut inner, self.capacity - size);
                inner.tick += 1;
                let tick = inner.tick;
                inner.bytes += size;
                inner.resident.insert(
                    key,
                    Resident {
                        data: data.clone(),
                        last_used: tick,
                    },
                );
            } else {
                debug!(?key, size, "artifact exceeds cache capacity, serving uncached");
            }
        }

        drop(inner);

        // The caller fans the result out so completions never run under the
        // cache lock.
        waiters
    }

    /// Evict least-recently-used artifacts until `bytes` fits within target.
    fn evict_for(inner: &mut Inner, target: u64) {
        while inner.bytes > target {
            let oldest = inner
                .resident
                .iter()
                .min_by_key(|(_, r)| r.last_used)
                .map(|(k, _)| *k);
            match oldest {
                Some(key) => {
                    if let Some(evicted) = inner.resident.remove(&key) {
                        inner.bytes -= evicted.data.len() as u64;
                        trace!(?key, "evicted artifact");
                    }
                }
                None => break,
            }
        }
    }

    /// Drop all resident artifacts belonging to a mount. In-flight builds
    /// finish on their own; their waiters were already registered.
    pub fn remove_mount(&self, mount: MountId) {
        let mut inner = self.inner.lock();
        let keys: Vec<FrameKey> = inner
            .resident
            .keys()
            .filter(|k| k.mount == mount)
            .copied()
            .collect();
        for key in keys {
            if let Some(evicted) = inner.resident.remove(&key) {
                inner.bytes -= evicted.data.len() as u64;
            }
        }
    }
}
