//! GPU memory tracking and reclamation
//!
//! Every buffer and texture the renderer uploads goes through the
//! [`GraphicsMemManager`], which hands out shared handles. A handle's
//! [`bind`](GpuHandle::bind) is the only thing that refreshes its recency.
//! [`free_old_resources`](GraphicsMemManager::free_old_resources) reclaims a
//! resource once it has gone unbound for longer than the time threshold
//! **and** for more frames than the frame threshold.

use crate::config::MemoryConfig;
use crate::foundation::time::Clock;
use crate::render::backend::{BufferUsage, GpuBackend, GpuId, TextureDesc};
use crate::render::{RenderError, RenderResult};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Marker for texture handles
#[derive(Debug)]
pub enum TextureResource {}

/// Marker for buffer handles
#[derive(Debug)]
pub enum BufferResource {}

#[derive(Debug)]
struct HandleState {
    id: GpuId,
    bytes: usize,
    valid: AtomicBool,
    pinned: AtomicBool,
    last_used_nanos: AtomicU64,
    last_used_frame: AtomicU64,
}

/// Shared reference to a tracked GPU resource
///
/// Clones refer to the same resource. Once the manager frees it, every clone
/// reports `!is_valid()` and `bind` fails with [`RenderError::StaleHandle`].
pub struct GpuHandle<K> {
    state: Arc<HandleState>,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to a tracked texture
pub type TexHandle = GpuHandle<TextureResource>;

/// Handle to a tracked buffer
pub type BufferHandle = GpuHandle<BufferResource>;

impl<K> Clone for GpuHandle<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for GpuHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuHandle")
            .field("id", &self.state.id)
            .field("bytes", &self.state.bytes)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<K> PartialEq for GpuHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<K> Eq for GpuHandle<K> {}

impl<K> GpuHandle<K> {
    fn new(id: GpuId, bytes: usize, now: Duration, frame: u64) -> Self {
        Self {
            state: Arc::new(HandleState {
                id,
                bytes,
                valid: AtomicBool::new(true),
                pinned: AtomicBool::new(false),
                last_used_nanos: AtomicU64::new(duration_nanos(now)),
                last_used_frame: AtomicU64::new(frame),
            }),
            _kind: PhantomData,
        }
    }

    /// Mark as used now and return the backend id
    pub fn bind(&self, mem: &GraphicsMemManager) -> RenderResult<GpuId> {
        if !self.is_valid() {
            return Err(RenderError::StaleHandle(self.state.id));
        }
        self.state
            .last_used_nanos
            .store(duration_nanos(mem.clock.now()), Ordering::Relaxed);
        self.state
            .last_used_frame
            .store(mem.frame, Ordering::Relaxed);
        Ok(self.state.id)
    }

    /// Backend id without touching recency
    pub fn id(&self) -> GpuId {
        self.state.id
    }

    /// Size in bytes
    pub fn bytes(&self) -> usize {
        self.state.bytes
    }

    /// Whether the resource is still alive
    pub fn is_valid(&self) -> bool {
        self.state.valid.load(Ordering::Acquire)
    }

    /// Whether the resource is exempt from reclamation
    pub fn is_pinned(&self) -> bool {
        self.state.pinned.load(Ordering::Relaxed)
    }

    /// Time of the last bind, on the manager's clock
    pub fn last_used_time(&self) -> Duration {
        Duration::from_nanos(self.state.last_used_nanos.load(Ordering::Relaxed))
    }

    /// Frame of the last bind
    pub fn last_used_frame(&self) -> u64 {
        self.state.last_used_frame.load(Ordering::Relaxed)
    }

    fn is_stale(&self, now: Duration, frame: u64, config: &MemoryConfig) -> bool {
        !self.is_pinned()
            && now.saturating_sub(self.last_used_time()) > config.time_threshold()
            && frame.saturating_sub(self.last_used_frame()) > config.frame_threshold
    }

    fn invalidate(&self) -> bool {
        self.state.valid.swap(false, Ordering::AcqRel)
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Live GPU memory counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Live textures
    pub textures: usize,
    /// Live buffers
    pub buffers: usize,
    /// Bytes held by live textures
    pub texture_bytes: usize,
    /// Bytes held by live buffers
    pub buffer_bytes: usize,
    /// Resources reclaimed over the manager's life
    pub reclaimed: u64,
}

/// Allocates and reclaims GPU buffers and textures
pub struct GraphicsMemManager {
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
    frame: u64,
    textures: Vec<TexHandle>,
    buffers: Vec<BufferHandle>,
    reclaimed: u64,
}

impl GraphicsMemManager {
    /// Manager using `clock` for the time threshold
    pub fn new(clock: Arc<dyn Clock>, config: MemoryConfig) -> Self {
        Self {
            clock,
            config,
            frame: 0,
            textures: Vec::new(),
            buffers: Vec::new(),
            reclaimed: 0,
        }
    }

    /// Advance the frame counter
    pub fn tick_frame(&mut self) {
        self.frame += 1;
    }

    /// Current frame number
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Current time on the manager's clock
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Upload a texture and start tracking it
    pub fn alloc_texture(
        &mut self,
        backend: &mut dyn GpuBackend,
        desc: &TextureDesc,
        data: &[u8],
    ) -> RenderResult<TexHandle> {
        let id = backend.create_texture(desc, data)?;
        let handle = TexHandle::new(id, data.len(), self.clock.now(), self.frame);
        log::trace!("Allocated texture {} ({} bytes)", id, data.len());
        self.textures.push(handle.clone());
        Ok(handle)
    }

    /// Upload a buffer and start tracking it
    pub fn alloc_buffer(
        &mut self,
        backend: &mut dyn GpuBackend,
        usage: BufferUsage,
        data: &[u8],
    ) -> RenderResult<BufferHandle> {
        let id = backend.create_buffer(usage, data)?;
        let handle = BufferHandle::new(id, data.len(), self.clock.now(), self.frame);
        log::trace!("Allocated {:?} buffer {} ({} bytes)", usage, id, data.len());
        self.buffers.push(handle.clone());
        Ok(handle)
    }

    /// Exempt a resource from reclamation
    pub fn pin<K>(handle: &GpuHandle<K>) {
        handle.state.pinned.store(true, Ordering::Relaxed);
    }

    /// Free a texture now
    pub fn free_texture(&mut self, backend: &mut dyn GpuBackend, handle: &TexHandle) {
        if handle.invalidate() {
            backend.delete_texture(handle.id());
        }
        self.textures.retain(|h| h != handle);
    }

    /// Free a buffer now
    pub fn free_buffer(&mut self, backend: &mut dyn GpuBackend, handle: &BufferHandle) {
        if handle.invalidate() {
            backend.delete_buffer(handle.id());
        }
        self.buffers.retain(|h| h != handle);
    }

    /// Reclaim every resource past both idle thresholds
    ///
    /// Returns the number of resources freed.
    pub fn free_old_resources(&mut self, backend: &mut dyn GpuBackend) -> usize {
        let now = self.clock.now();
        let frame = self.frame;
        let config = &self.config;
        let mut freed = 0;

        self.textures.retain(|handle| {
            if handle.is_stale(now, frame, config) {
                if handle.invalidate() {
                    backend.delete_texture(handle.id());
                    freed += 1;
                }
                false
            } else {
                handle.is_valid()
            }
        });
        self.buffers.retain(|handle| {
            if handle.is_stale(now, frame, config) {
                if handle.invalidate() {
                    backend.delete_buffer(handle.id());
                    freed += 1;
                }
                false
            } else {
                handle.is_valid()
            }
        });

        if freed > 0 {
            log::debug!("Reclaimed {} idle GPU resources at frame {}", freed, frame);
        }
        self.reclaimed += freed as u64;
        freed
    }

    /// Free everything, pinned resources included
    pub fn free_all(&mut self, backend: &mut dyn GpuBackend) {
        for handle in self.textures.drain(..) {
            if handle.invalidate() {
                backend.delete_texture(handle.id());
            }
        }
        for handle in self.buffers.drain(..) {
            if handle.invalidate() {
                backend.delete_buffer(handle.id());
            }
        }
    }

    /// Live resource counters
    pub fn stats(&self) -> MemoryStats {
        let live_textures = self.textures.iter().filter(|h| h.is_valid());
        let live_buffers = self.buffers.iter().filter(|h| h.is_valid());
        MemoryStats {
            textures: live_textures.clone().count(),
            buffers: live_buffers.clone().count(),
            texture_bytes: live_textures.map(GpuHandle::bytes).sum(),
            buffer_bytes: live_buffers.map(GpuHandle::bytes).sum(),
            reclaimed: self.reclaimed,
        }
    }
}
