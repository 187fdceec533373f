//! Render scheduling, GPU residency and picking
//!
//! All GPU work happens on the render thread owned by [`Renderer`]. Other
//! threads publish [`ProxyScene`] snapshots, post messages and run picking
//! queries against the latest renderable list.

pub mod backend;
pub mod backends;
pub mod camera;
pub mod frame;
pub mod future;
pub mod gpu_memory;
pub mod mesh_proto;
pub mod picking;
pub mod proxy;
pub mod renderables;
pub mod renderer;
pub mod texture_cache;
pub mod visibility;

pub use backend::{
    BufferUsage, ContextId, DrawCall, GpuBackend, GpuId, LogDepth, OverlayDraw, RenderTarget,
    TextureDesc, WindowDesc,
};
pub use backends::HeadlessBackend;
pub use camera::{Camera, CameraInfo};
pub use frame::{FrameContext, FrameStats};
pub use future::RenderFuture;
pub use gpu_memory::{BufferHandle, GraphicsMemManager, MemoryStats, TexHandle};
pub use mesh_proto::{MeshProto, MeshProtoCache};
pub use picking::PickHit;
pub use proxy::{OverlayContent, OverlayProxy, ProxyKind, ProxyScene, RenderProxy, RenderableKey};
pub use renderables::{Renderable, RenderableCache, RenderableList};
pub use renderer::{FreeRequest, Renderer, RendererBuilder};
pub use texture_cache::{TexCache, TextureLookup};
pub use visibility::{ViewId, VisibilityInfo, WindowId};

use crate::assets::AssetError;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Image read back from an offscreen render
pub type Image = crate::assets::DecodedImage;

/// Rendering errors
///
/// These errors provide high-level categorization of rendering failures
/// without exposing backend-specific details.
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Fatal: the render thread records it and exits.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),

    /// The GPU could not satisfy an allocation
    #[error("Out of GPU memory: {0}")]
    OutOfMemory(String),

    /// No usable graphics context for the request
    #[error("Graphics context unavailable: {0}")]
    ContextUnavailable(String),

    /// A GPU handle was used after its resource was reclaimed
    #[error("Stale GPU handle {0}")]
    StaleHandle(GpuId),

    /// No window with this id
    #[error("Unknown window {0:?}")]
    UnknownWindow(WindowId),

    /// Blocking on the render thread would wait on itself
    #[error("Blocking wait on the render thread would deadlock")]
    WouldDeadlock,

    /// The renderer has stopped
    #[error("Renderer is shut down")]
    Shutdown,

    /// Asset loading failed
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Sticky record of the error that stopped the render thread
#[derive(Clone)]
pub struct FatalError {
    message: String,
    backtrace: Arc<Backtrace>,
}

impl FatalError {
    /// Capture a fatal error with the current backtrace
    pub fn capture(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backtrace: Arc::new(Backtrace::force_capture()),
        }
    }

    /// What went wrong
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where it went wrong
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Debug for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatalError")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.message, self.backtrace)
    }
}
