//! GPU backend abstraction
//!
//! The renderer drives a [`GpuBackend`] exclusively from the render thread.
//! Resource ids are opaque `u32`s chosen by the backend; the renderer tracks
//! their lifetime through [`GraphicsMemManager`].
//!
//! [`GraphicsMemManager`]: crate::render::GraphicsMemManager

use crate::assets::compress::TextureFormat;
use crate::assets::{Primitive, TexFlags};
use crate::foundation::math::Mat4;
use crate::render::RenderResult;

/// Opaque backend resource id
pub type GpuId = u32;

/// Graphics context (one per window plus one hidden shared context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    /// Window title
    pub title: String,
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
    /// Hidden contexts never present
    pub hidden: bool,
}

impl WindowDesc {
    /// Visible window
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            hidden: false,
        }
    }

    /// Hidden 1x1 context used for offscreen work and resource sharing
    pub fn hidden() -> Self {
        Self {
            title: String::from("shared"),
            width: 1,
            height: 1,
            hidden: true,
        }
    }
}

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Interleaved vertex data
    Vertex,
    /// `u32` indices
    Index,
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Storage format of the supplied data
    pub format: TextureFormat,
    /// Sampling options
    pub flags: TexFlags,
}

impl TextureDesc {
    /// Bytes of texel data this description expects
    pub fn byte_size(&self) -> usize {
        self.format.byte_size(self.width, self.height)
    }
}

/// Where a pass renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The default framebuffer of a window context
    Window(ContextId),
    /// An offscreen color target
    Offscreen(GpuId),
}

/// Logarithmic depth constants passed to every 3D draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogDepth {
    /// Resolution constant `C`
    pub c: f32,
    /// `2 / log2(C * far + 1)`
    pub fc: f32,
}

/// One indexed 3D draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Vertex array of the current context
    pub vertex_array: GpuId,
    /// Topology
    pub primitive: Primitive,
    /// First index in the bound index buffer
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Object to world
    pub model: Mat4,
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// RGBA color multiplied with the texture
    pub color: [f32; 4],
    /// Bound texture, if any
    pub texture: Option<GpuId>,
    /// Blend instead of overwrite
    pub blend: bool,
    /// Depth encoding
    pub log_depth: LogDepth,
    /// Picking id, for backends that render an id buffer
    pub object_id: Option<u32>,
}

/// One screen-space rectangle drawn after the 3D pass
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayDraw {
    /// `[x, y, width, height]` in pixels, origin top-left
    pub rect: [f32; 4],
    /// RGBA color
    pub color: [f32; 4],
    /// Bound texture, if any
    pub texture: Option<GpuId>,
}

/// Graphics API seam
///
/// Every method is called on the render thread only. Implementations report
/// exhausted memory as [`RenderError::OutOfMemory`] so callers can fall back
/// to placeholders.
///
/// [`RenderError::OutOfMemory`]: crate::render::RenderError::OutOfMemory
pub trait GpuBackend {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Create a context (and its window unless hidden)
    fn create_context(&mut self, desc: &WindowDesc) -> RenderResult<ContextId>;

    /// Destroy a context and its window
    fn destroy_context(&mut self, context: ContextId);

    /// Make a context current
    fn make_current(&mut self, context: ContextId) -> RenderResult<()>;

    /// Current drawable size of a context
    fn surface_size(&self, context: ContextId) -> RenderResult<(u32, u32)>;

    /// Swap buffers
    fn present(&mut self, context: ContextId) -> RenderResult<()>;

    /// Upload a buffer shared by all contexts
    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> RenderResult<GpuId>;

    /// Free a buffer
    fn delete_buffer(&mut self, id: GpuId);

    /// Upload a texture shared by all contexts
    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<GpuId>;

    /// Free a texture
    fn delete_texture(&mut self, id: GpuId);

    /// Vertex array binding a vertex and index buffer in one context
    fn create_vertex_array(
        &mut self,
        context: ContextId,
        vertex_buffer: GpuId,
        index_buffer: GpuId,
    ) -> RenderResult<GpuId>;

    /// Free a vertex array of a context
    fn delete_vertex_array(&mut self, context: ContextId, id: GpuId);

    /// Start a pass: bind the target, set the viewport, clear
    fn begin_pass(&mut self, target: RenderTarget, size: (u32, u32), clear_color: [f32; 4]) -> RenderResult<()>;

    /// Draw indexed geometry
    fn draw(&mut self, call: &DrawCall) -> RenderResult<()>;

    /// Draw the skybox cube map behind everything
    fn draw_skybox(&mut self, texture: GpuId, view: &Mat4, projection: &Mat4) -> RenderResult<()>;

    /// Draw a screen-space rectangle
    fn draw_overlay(&mut self, overlay: &OverlayDraw) -> RenderResult<()>;

    /// Create an RGBA8 offscreen target
    fn create_offscreen_target(&mut self, width: u32, height: u32) -> RenderResult<GpuId>;

    /// Free an offscreen target
    fn delete_offscreen_target(&mut self, id: GpuId);

    /// Read an offscreen target back as RGBA8 rows, top row first
    fn read_pixels(&mut self, target: GpuId) -> RenderResult<Vec<u8>>;
}
