//! Renderer-owned renderable cache
//!
//! Proxies with the same draw content share one renderable. Entries are
//! found by content hash and confirmed by comparing the content itself, so
//! colliding hashes get separate entries. Entries not referenced by the
//! latest scene are released when the generation that replaced it ends.

use super::{build_renderable, Renderable};
use crate::render::backend::{ContextId, GpuBackend};
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProtoCache;
use crate::render::proxy::{ProxyKind, RenderProxy, RenderableKey};
use crate::render::RenderResult;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::sync::Arc;

new_key_type! {
    /// Storage slot of a cached renderable
    pub struct RenderableSlot;
}

struct Entry {
    key: RenderableKey,
    kind: Arc<ProxyKind>,
    renderable: Arc<dyn Renderable>,
    last_seen: u64,
}

/// Renderables by content key
#[derive(Default)]
pub struct RenderableCache {
    entries: SlotMap<RenderableSlot, Entry>,
    index: HashMap<RenderableKey, Vec<RenderableSlot>>,
    generation: u64,
}

impl RenderableCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Start resolving a new scene
    pub fn begin_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Renderable for `proxy`, building it on a miss
    ///
    /// An entry whose GPU objects were reclaimed is released and rebuilt.
    pub fn resolve(
        &mut self,
        proxy: &RenderProxy,
        protos: &mut MeshProtoCache,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Arc<dyn Renderable>> {
        self.resolve_keyed(proxy.key(), proxy.shared_kind(), protos, backend, mem)
    }

    fn find(&self, key: RenderableKey, kind: &Arc<ProxyKind>) -> Option<RenderableSlot> {
        self.index.get(&key)?.iter().copied().find(|&slot| {
            self.entries
                .get(slot)
                .is_some_and(|entry| Arc::ptr_eq(&entry.kind, kind) || *entry.kind == **kind)
        })
    }

    fn resolve_keyed(
        &mut self,
        key: RenderableKey,
        kind: &Arc<ProxyKind>,
        protos: &mut MeshProtoCache,
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Arc<dyn Renderable>> {
        if let Some(slot) = self.find(key, kind) {
            if let Some(entry) = self.entries.get_mut(slot) {
                if entry.renderable.is_valid() {
                    entry.last_seen = self.generation;
                    return Ok(Arc::clone(&entry.renderable));
                }
            }
            self.evict(slot, backend, mem);
        }

        let renderable = build_renderable(kind, protos, backend, mem)?;
        let slot = self.entries.insert(Entry {
            key,
            kind: Arc::clone(kind),
            renderable: Arc::clone(&renderable),
            last_seen: self.generation,
        });
        self.index.entry(key).or_default().push(slot);
        Ok(renderable)
    }

    /// Release the entry drawing `kind`, if any
    pub fn forget(&mut self, kind: &ProxyKind, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) -> bool {
        let key = kind.renderable_key();
        let slot = self.index.get(&key).and_then(|slots| {
            slots
                .iter()
                .copied()
                .find(|&slot| self.entries.get(slot).is_some_and(|entry| *entry.kind == *kind))
        });
        match slot {
            Some(slot) => {
                self.evict(slot, backend, mem);
                true
            }
            None => false,
        }
    }

    /// Release every entry the current generation did not resolve
    pub fn end_generation(&mut self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) -> usize {
        let stale: Vec<RenderableSlot> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_seen < self.generation)
            .map(|(slot, _)| slot)
            .collect();
        for &slot in &stale {
            self.evict(slot, backend, mem);
        }
        if !stale.is_empty() {
            log::debug!("Released {} unused renderables", stale.len());
        }
        stale.len()
    }

    fn evict(&mut self, slot: RenderableSlot, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) {
        if let Some(entry) = self.entries.remove(slot) {
            if let Some(slots) = self.index.get_mut(&entry.key) {
                slots.retain(|&s| s != slot);
                if slots.is_empty() {
                    self.index.remove(&entry.key);
                }
            }
            entry.renderable.release(backend, mem);
        }
    }

    /// Drop per-context objects of every entry
    pub fn release_context(&self, context: ContextId, backend: &mut dyn GpuBackend) {
        for entry in self.entries.values() {
            entry.renderable.release_context(context, backend);
        }
    }

    /// Release everything
    pub fn clear(&mut self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) {
        for (_, entry) in self.entries.drain() {
            entry.renderable.release(backend, mem);
        }
        self.index.clear();
    }

    /// Number of cached renderables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetError, GeometryLoader, MeshData, MeshDataCache};
    use crate::render::backends::HeadlessBackend;
    use crate::render::renderables::test_support::gpu;

    fn protos(backend: &mut HeadlessBackend, mem: &mut GraphicsMemManager) -> MeshProtoCache {
        let loader: Arc<dyn GeometryLoader> = Arc::new(|_: &str| Ok::<_, AssetError>(MeshData::placeholder_cube()));
        MeshProtoCache::new(Arc::new(MeshDataCache::new(loader)), backend, mem).unwrap()
    }

    fn lines(x: f32) -> RenderProxy {
        RenderProxy::new(ProxyKind::DebugLines {
            segments: vec![[[0.0; 3], [x, 1.0, 0.0]]],
            color: [1.0; 4],
        })
    }

    #[test]
    fn test_same_content_shares_renderable() {
        let (mut backend, mut mem) = gpu();
        let mut protos = protos(&mut backend, &mut mem);
        let mut cache = RenderableCache::new();
        cache.begin_generation();
        let a = cache.resolve(&RenderProxy::mesh("ship.obj"), &mut protos, &mut backend, &mut mem).unwrap();
        let b = cache.resolve(&RenderProxy::mesh("ship.obj").with_picking_id(4), &mut protos, &mut backend, &mut mem).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unseen_entries_are_released() {
        let (mut backend, mut mem) = gpu();
        let probe = backend.probe();
        let mut protos = protos(&mut backend, &mut mem);
        let mut cache = RenderableCache::new();

        cache.begin_generation();
        cache.resolve(&lines(1.0), &mut protos, &mut backend, &mut mem).unwrap();
        cache.resolve(&lines(2.0), &mut protos, &mut backend, &mut mem).unwrap();
        assert_eq!(cache.end_generation(&mut backend, &mut mem), 0);
        // Two per line renderable, two for the pinned placeholder mesh
        assert_eq!(probe.live_buffers(), 6);

        cache.begin_generation();
        cache.resolve(&lines(2.0), &mut protos, &mut backend, &mut mem).unwrap();
        assert_eq!(cache.end_generation(&mut backend, &mut mem), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(probe.live_buffers(), 4);
    }

    #[test]
    fn test_invalid_entry_is_rebuilt() {
        let (mut backend, mut mem) = gpu();
        let mut protos = protos(&mut backend, &mut mem);
        let mut cache = RenderableCache::new();
        cache.begin_generation();
        let first = cache.resolve(&lines(1.0), &mut protos, &mut backend, &mut mem).unwrap();
        first.release(&mut backend, &mut mem);
        let second = cache.resolve(&lines(1.0), &mut protos, &mut backend, &mut mem).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_valid());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_colliding_keys_keep_content_apart() {
        let (mut backend, mut mem) = gpu();
        let mut protos = protos(&mut backend, &mut mem);
        let mut cache = RenderableCache::new();
        cache.begin_generation();
        let key = RenderableKey(42);
        let a = Arc::new(lines(1.0).kind().clone());
        let b = Arc::new(lines(2.0).kind().clone());

        let first = cache.resolve_keyed(key, &a, &mut protos, &mut backend, &mut mem).unwrap();
        let second = cache.resolve_keyed(key, &b, &mut protos, &mut backend, &mut mem).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);

        let again = cache.resolve_keyed(key, &Arc::new(lines(1.0).kind().clone()), &mut protos, &mut backend, &mut mem).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.end_generation(&mut backend, &mut mem), 0);
    }

    #[test]
    fn test_forget_releases_entry() {
        let (mut backend, mut mem) = gpu();
        let mut protos = protos(&mut backend, &mut mem);
        let mut cache = RenderableCache::new();
        cache.begin_generation();
        let proxy = lines(3.0);
        cache.resolve(&proxy, &mut protos, &mut backend, &mut mem).unwrap();
        assert!(cache.forget(proxy.kind(), &mut backend, &mut mem));
        assert!(cache.is_empty());
        assert!(!cache.forget(proxy.kind(), &mut backend, &mut mem));
    }
}
