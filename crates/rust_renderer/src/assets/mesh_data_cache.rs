//! Thread-safe geometry-data cache
//!
//! At most one parse runs per key. A caller that asks for data whose load is
//! already in flight blocks until that load installs its result, then shares
//! it. A failed load, including a loader that panics, installs the
//! placeholder cube permanently for that key.

use crate::assets::{AssetError, GeometryLoader, LoaderPool, MeshData, MeshProtoKey};
use crate::foundation::sync::{catch_panic, lock, Completion};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Pending = Arc<Completion<Arc<MeshData>>>;

#[derive(Default)]
struct CacheState {
    loaded: HashMap<MeshProtoKey, Arc<MeshData>>,
    loading: HashMap<MeshProtoKey, Pending>,
    failed: HashSet<MeshProtoKey>,
}

enum Claim {
    Ready(Arc<MeshData>),
    InFlight(Pending),
    Owner(Pending),
}

/// Parsed geometry shared across threads
pub struct MeshDataCache {
    loader: Arc<dyn GeometryLoader>,
    state: Mutex<CacheState>,
    placeholder: Arc<MeshData>,
    parses: AtomicUsize,
}

impl MeshDataCache {
    /// Cache parsing through `loader`
    pub fn new(loader: Arc<dyn GeometryLoader>) -> Self {
        Self {
            loader,
            state: Mutex::new(CacheState::default()),
            placeholder: Arc::new(MeshData::placeholder_cube()),
            parses: AtomicUsize::new(0),
        }
    }

    /// Data for `key`, parsing it on this thread if nobody else is
    ///
    /// Never fails: load errors yield the placeholder.
    pub fn get_data(&self, key: &MeshProtoKey) -> Arc<MeshData> {
        match self.claim(key) {
            Claim::Ready(data) => data,
            Claim::InFlight(pending) => pending.wait(),
            Claim::Owner(pending) => self.load_and_install(key, &pending),
        }
    }

    /// Start a background parse of `key` unless it is loaded or loading
    ///
    /// Returns true if a new load was queued.
    pub fn load_async(self: &Arc<Self>, key: &MeshProtoKey, pool: &LoaderPool) -> bool {
        let Claim::Owner(pending) = self.claim(key) else {
            return false;
        };
        let cache = Arc::clone(self);
        let job_key = key.clone();
        let job_pending = Arc::clone(&pending);
        let queued = pool.execute(move || {
            cache.load_and_install(&job_key, &job_pending);
        });
        if !queued {
            // Pool gone: load here so waiters are not stranded
            self.load_and_install(key, &pending);
        }
        queued
    }

    /// Data for `key` if already installed
    pub fn try_get(&self, key: &MeshProtoKey) -> Option<Arc<MeshData>> {
        lock(&self.state).loaded.get(key).cloned()
    }

    /// Whether `key` is loaded or loading
    pub fn contains(&self, key: &MeshProtoKey) -> bool {
        let state = lock(&self.state);
        state.loaded.contains_key(key) || state.loading.contains_key(key)
    }

    /// Whether `key` failed to load and holds the placeholder
    pub fn is_failed(&self, key: &MeshProtoKey) -> bool {
        lock(&self.state).failed.contains(key)
    }

    /// Drop installed data for `key`; in-flight loads are left alone
    ///
    /// A failed key keeps its placeholder.
    pub fn remove(&self, key: &MeshProtoKey) -> bool {
        let mut state = lock(&self.state);
        if state.failed.contains(key) {
            return false;
        }
        state.loaded.remove(key).is_some()
    }

    /// Number of installed entries
    pub fn len(&self) -> usize {
        lock(&self.state).loaded.len()
    }

    /// Whether nothing is installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parses started over the cache's life
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    /// Placeholder returned for failed loads
    pub fn placeholder(&self) -> &Arc<MeshData> {
        &self.placeholder
    }

    fn claim(&self, key: &MeshProtoKey) -> Claim {
        let mut state = lock(&self.state);
        if let Some(data) = state.loaded.get(key) {
            return Claim::Ready(Arc::clone(data));
        }
        if let Some(pending) = state.loading.get(key) {
            return Claim::InFlight(Arc::clone(pending));
        }
        let pending: Pending = Arc::new(Completion::new());
        state.loading.insert(key.clone(), Arc::clone(&pending));
        Claim::Owner(pending)
    }

    fn load_and_install(&self, key: &MeshProtoKey, pending: &Completion<Arc<MeshData>>) -> Arc<MeshData> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let parsed = catch_panic(|| self.loader.parse(key.uri()))
            .unwrap_or_else(|message| Err(AssetError::LoadFailed(format!("loader panicked: {message}"))));
        let (data, failed) = match parsed {
            Ok(data) => {
                log::debug!("Loaded geometry {}", key);
                (Arc::new(data), false)
            }
            Err(e) => {
                log::warn!("Failed to load geometry {}: {}; using placeholder", key, e);
                (Arc::clone(&self.placeholder), true)
            }
        };

        {
            let mut state = lock(&self.state);
            state.loading.remove(key);
            state.loaded.insert(key.clone(), Arc::clone(&data));
            if failed {
                state.failed.insert(key.clone());
            }
        }
        pending.complete(Arc::clone(&data));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn slow_loader(calls: Arc<AtomicUsize>) -> Arc<dyn GeometryLoader> {
        Arc::new(move |uri: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            if uri == "missing" {
                Err(AssetError::NotFound(uri.to_string()))
            } else {
                Ok(MeshData::placeholder_cube())
            }
        })
    }

    #[test]
    fn test_concurrent_get_parses_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(MeshDataCache::new(slow_loader(Arc::clone(&calls))));
        let key = MeshProtoKey::new("ship.obj");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_data(&key)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.parse_count(), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failure_installs_permanent_placeholder() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MeshDataCache::new(slow_loader(Arc::clone(&calls)));
        let key = MeshProtoKey::new("missing");

        let first = cache.get_data(&key);
        assert!(Arc::ptr_eq(&first, cache.placeholder()));
        assert!(cache.is_failed(&key));
        assert!(!cache.remove(&key));

        let again = cache.get_data(&key);
        assert!(Arc::ptr_eq(&again, cache.placeholder()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_async_then_get_shares_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(MeshDataCache::new(slow_loader(Arc::clone(&calls))));
        let pool = LoaderPool::new(2);
        let key = MeshProtoKey::new("rock.obj");

        assert!(cache.load_async(&key, &pool));
        assert!(!cache.load_async(&key, &pool));
        let data = cache.get_data(&key);
        assert_eq!(data.triangles().count(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_loader_wakes_waiters_with_placeholder() {
        let loader: Arc<dyn GeometryLoader> = Arc::new(|uri: &str| -> Result<MeshData, AssetError> {
            thread::sleep(Duration::from_millis(20));
            panic!("cannot parse {uri}")
        });
        let cache = Arc::new(MeshDataCache::new(loader));
        let pool = LoaderPool::new(1);
        let key = MeshProtoKey::new("bad.obj");

        assert!(cache.load_async(&key, &pool));
        let waiter = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            thread::spawn(move || cache.get_data(&key))
        };
        let data = waiter.join().unwrap();
        assert!(Arc::ptr_eq(&data, cache.placeholder()));
        assert!(cache.is_failed(&key));
        assert!(cache.try_get(&key).is_some());
    }

    #[test]
    fn test_remove_allows_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MeshDataCache::new(slow_loader(Arc::clone(&calls)));
        let key = MeshProtoKey::new("a.obj");
        cache.get_data(&key);
        assert!(cache.remove(&key));
        assert!(cache.is_empty());
        cache.get_data(&key);
        assert_eq!(cache.parse_count(), 2);
    }
}
