// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::assets::Unload;
use crate::error::{BundleError, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

type Outcome<H> = Result<Arc<H>>;

/// Entry in the bundle cache.
///
/// `generation` identifies the load that created the entry. It is carried
/// from `Loading` into the `Ready` entry that load produced.
enum Slot<H> {
    /// A fetch is in flight. `joiners` callers are waiting on it and each
    /// already owns one reference once it lands.
    Loading {
        generation: u64,
        joiners: usize,
        ready: watch::Receiver<Option<Outcome<H>>>,
    },
    /// Resident with `count` outstanding acquisitions
    Ready {
        generation: u64,
        handle: Arc<H>,
        count: usize,
    },
}

/// Cache statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub evictions: u64,
    pub total_loads: u64,
    pub failed_loads: u64,
}

impl CacheStats {
    /// Share of acquisitions served without starting a fetch
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.joins + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.joins) as f32 / total as f32
        }
    }
}

/// How an acquisition was served
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Entry was already resident
    Cached,
    /// Joined a fetch started by another caller
    Joined,
    /// This caller ran the factory
    Loaded,
}

/// A successful acquisition
#[derive(Debug)]
pub struct Acquired<H> {
    pub handle: Arc<H>,
    pub origin: Origin,
}

struct Inner<H> {
    slots: AHashMap<String, Slot<H>>,
    stats: CacheStats,
    next_generation: u64,
}

/// Reference-counted bundle cache with single-flight loading.
///
/// Every state transition happens under one internal lock; the lock is
/// never held across an await point.
pub struct RefCountCache<H: Unload> {
    inner: Mutex<Inner<H>>,
    keep_loaded_objects: bool,
}

impl<H: Unload> RefCountCache<H> {
    /// Create an empty cache that unloads with `keep_loaded_objects = false`
    pub fn new() -> Self {
        Self::with_unload_policy(false)
    }

    pub fn with_unload_policy(keep_loaded_objects: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: AHashMap::new(),
                stats: CacheStats::default(),
                next_generation: 0,
            }),
            keep_loaded_objects,
        }
    }

    /// Increment the entry for `key`, or create it with `factory`.
    ///
    /// Concurrent callers for a missing key share one factory call and all
    /// receive its outcome. A failed load leaves no entry behind.
    pub async fn acquire_or_create<F, Fut>(&self, key: &str, factory: F) -> Result<Arc<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        self.acquire_tracked(key, factory).await.map(|acquired| acquired.handle)
    }

    /// [`acquire_or_create`](Self::acquire_or_create), also reporting how
    /// the handle was obtained
    pub async fn acquire_tracked<F, Fut>(&self, key: &str, factory: F) -> Result<Acquired<H>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        let (tx, generation, mut ready) = {
            let mut guard = self.inner.lock();
            let Inner {
                slots,
                stats,
                next_generation,
            } = &mut *guard;
            match slots.get_mut(key) {
                Some(Slot::Ready { handle, count, .. }) => {
                    *count += 1;
                    stats.hits += 1;
                    debug!(key, count = *count, "bundle cache hit");
                    return Ok(Acquired {
                        handle: handle.clone(),
                        origin: Origin::Cached,
                    });
                }
                Some(Slot::Loading {
                    generation,
                    joiners,
                    ready,
                }) => {
                    *joiners += 1;
                    stats.joins += 1;
                    debug!(key, joiners = *joiners, "joining in-flight bundle load");
                    (None, *generation, ready.clone())
                }
                None => {
                    let generation = *next_generation;
                    *next_generation += 1;
                    let (tx, rx) = watch::channel(None);
                    slots.insert(
                        key.to_string(),
                        Slot::Loading {
                            generation,
                            joiners: 0,
                            ready: rx.clone(),
                        },
                    );
                    stats.misses += 1;
                    (Some(tx), generation, rx)
                }
            }
        };

        let Some(tx) = tx else {
            let mut waiter = JoinGuard {
                cache: self,
                key,
                generation,
                armed: true,
            };
            let outcome = match ready.wait_for(Option::is_some).await {
                Ok(value) => value.clone(),
                Err(_) => None,
            };
            waiter.armed = false;
            return match outcome {
                Some(Ok(handle)) => Ok(Acquired {
                    handle,
                    origin: Origin::Joined,
                }),
                Some(Err(err)) => Err(err),
                None => Err(BundleError::LoadAbandoned(key.to_string())),
            };
        };

        let mut leader = LeaderGuard {
            cache: self,
            key,
            generation,
            tx: Some(tx),
        };
        let loaded = factory().await;

        let outcome = {
            let mut guard = self.inner.lock();
            let Inner { slots, stats, .. } = &mut *guard;
            let joiners = match slots.get(key) {
                Some(Slot::Loading {
                    generation: current,
                    joiners,
                    ..
                }) if *current == generation => {
                    let joiners = *joiners;
                    slots.remove(key);
                    joiners
                }
                _ => 0,
            };
            match loaded {
                Ok(bundle) => {
                    let handle = Arc::new(bundle);
                    slots.insert(
                        key.to_string(),
                        Slot::Ready {
                            generation,
                            handle: handle.clone(),
                            count: 1 + joiners,
                        },
                    );
                    stats.total_loads += 1;
                    debug!(key, count = 1 + joiners, "bundle cached");
                    Ok(handle)
                }
                Err(err) => {
                    stats.failed_loads += 1;
                    Err(err)
                }
            }
        };
        leader.finish(outcome.clone());

        outcome.map(|handle| Acquired {
            handle,
            origin: Origin::Loaded,
        })
    }

    /// Drop one reference. Returns `true` if this was the last one and the
    /// handle was unloaded.
    pub fn release(&self, key: &str) -> Result<bool> {
        let mut guard = self.inner.lock();
        match Self::release_locked(&mut guard, key, None) {
            Some(Some(handle)) => {
                handle.unload(self.keep_loaded_objects);
                debug!(key, "bundle evicted");
                Ok(true)
            }
            Some(None) => Ok(false),
            None => {
                warn!(key, "release of bundle that is not cached");
                Err(BundleError::UnknownKey(key.to_string()))
            }
        }
    }

    /// `None` if `key` is not resident (or is resident from a different
    /// load than `generation`), `Some(Some(handle))` if the entry was removed
    fn release_locked(
        inner: &mut Inner<H>,
        key: &str,
        generation: Option<u64>,
    ) -> Option<Option<Arc<H>>> {
        let remaining = match inner.slots.get_mut(key) {
            Some(Slot::Ready {
                generation: current,
                count,
                ..
            }) if generation.map_or(true, |g| g == *current) => {
                *count -= 1;
                *count
            }
            _ => return None,
        };
        if remaining > 0 {
            return Some(None);
        }
        match inner.slots.remove(key) {
            Some(Slot::Ready { handle, .. }) => {
                inner.stats.evictions += 1;
                Some(Some(handle))
            }
            _ => Some(None),
        }
    }

    /// Handle for a resident key without touching its count
    pub fn peek_untracked(&self, key: &str) -> Result<Arc<H>> {
        match self.inner.lock().slots.get(key) {
            Some(Slot::Ready { handle, .. }) => Ok(handle.clone()),
            _ => Err(BundleError::UnknownKey(key.to_string())),
        }
    }

    /// Reference count of a resident key
    pub fn ref_count(&self, key: &str) -> Option<usize> {
        match self.inner.lock().slots.get(key) {
            Some(Slot::Ready { count, .. }) => Some(*count),
            _ => None,
        }
    }

    /// True if `key` is resident
    pub fn contains_key(&self, key: &str) -> bool {
        self.ref_count(key).is_some()
    }

    /// True while a fetch for `key` is in flight
    pub fn is_loading(&self, key: &str) -> bool {
        matches!(
            self.inner.lock().slots.get(key),
            Some(Slot::Loading { .. })
        )
    }

    /// Resident keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready { .. }))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of resident bundles
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }
}

impl<H: Unload> Default for RefCountCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears a `Loading` slot if the task running the factory goes away
struct LeaderGuard<'a, H: Unload> {
    cache: &'a RefCountCache<H>,
    key: &'a str,
    generation: u64,
    tx: Option<watch::Sender<Option<Outcome<H>>>>,
}

impl<H: Unload> LeaderGuard<'_, H> {
    fn finish(&mut self, outcome: Outcome<H>) {
        if let Some(tx) = self.tx.take() {
            // Joiners may all be gone; that is fine.
            let _ = tx.send(Some(outcome));
        }
    }
}

impl<H: Unload> Drop for LeaderGuard<'_, H> {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        {
            let mut inner = self.cache.inner.lock();
            if matches!(
                inner.slots.get(self.key),
                Some(Slot::Loading { generation, .. }) if *generation == self.generation
            ) {
                inner.slots.remove(self.key);
            }
        }
        warn!(key = self.key, "bundle load abandoned");
        let _ = tx.send(Some(Err(BundleError::LoadAbandoned(self.key.to_string()))));
    }
}

/// Gives back a joiner's reserved reference if it stops waiting early.
///
/// Only the load it joined, or the entry that load produced, is touched.
/// If that load failed or was abandoned the reservation is already gone.
struct JoinGuard<'a, H: Unload> {
    cache: &'a RefCountCache<H>,
    key: &'a str,
    generation: u64,
    armed: bool,
}

impl<H: Unload> Drop for JoinGuard<'_, H> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.cache.inner.lock();
        if let Some(Slot::Loading {
            generation,
            joiners,
            ..
        }) = inner.slots.get_mut(self.key)
        {
            if *generation == self.generation {
                *joiners = joiners.saturating_sub(1);
            }
            return;
        }
        let released =
            RefCountCache::release_locked(&mut inner, self.key, Some(self.generation));
        if let Some(Some(handle)) = released {
            debug!(key = self.key, "bundle evicted by dropped joiner");
            handle.unload(self.cache.keep_loaded_objects);
        }
    }
}
