//! Per-pass draw state and statistics

use crate::render::backend::{ContextId, GpuBackend, LogDepth};
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::texture_cache::TexCache;
use crate::foundation::math::Mat4;

/// Everything a renderable needs to issue draws for one pass
pub struct FrameContext<'a> {
    /// Backend, with the pass's context current
    pub backend: &'a mut dyn GpuBackend,
    /// Memory manager for binding handles
    pub mem: &'a GraphicsMemManager,
    /// Texture lookups
    pub textures: &'a mut TexCache,
    /// Context of this pass, for vertex arrays
    pub context: ContextId,
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// Depth constants
    pub log_depth: LogDepth,
    /// Draw calls issued so far
    pub draw_calls: usize,
}

/// Counters of one rendered view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number the view was drawn in
    pub frame: u64,
    /// Backend draw calls, overlays and skybox included
    pub draw_calls: usize,
    /// Renderables considered
    pub objects: usize,
    /// Rejected by the frustum
    pub frustum_culled: usize,
    /// Rejected for being too small on screen
    pub size_culled: usize,
    /// Drawn in the sorted transparent pass
    pub transparent: usize,
    /// Overlays drawn
    pub overlays: usize,
    /// Renderables whose draw failed
    pub errors: usize,
}
