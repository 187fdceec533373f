//! Render scheduler
//!
//! [`Renderer`] is the thread-safe front of a dedicated render thread that
//! owns the [`GpuBackend`] and every GPU cache. Callers publish scenes, post
//! window and resource messages, and query picks; the render thread applies
//! them once per iteration:
//!
//! 1. GPU housekeeping: advance the frame, evict idle resources, upload
//!    finished texture decodes
//! 2. rebuild the renderable list if a newer scene was published (or a
//!    renderable lost its GPU objects)
//! 3. drain the message queue
//! 4. draw every window, then serve offscreen requests
//! 5. sleep until a redraw is requested; waking on the idle timeout instead
//!    runs eviction and texture uploads only, without drawing
//!
//! A scene published with [`Renderer::set_scene`] replaces the previous one
//! wholesale; if two scenes are published between frames only the second is
//! ever drawn.

mod render_thread;

use crate::assets::{
    AssetResolver, GeometryLoader, ImageDecoder, LoaderPool, MeshDataCache, MeshProtoKey, ObjLoader,
    TextureDecoder, TextureKey,
};
use crate::config::RendererConfig;
use crate::foundation::math::utils;
use crate::foundation::sync::{is_render_thread, lock, read, Completion, RedrawSignal};
use crate::foundation::time::{Clock, SystemClock};
use crate::geometry::Ray;
use crate::render::backend::{GpuBackend, WindowDesc};
use crate::render::camera::CameraInfo;
use crate::render::frame::FrameStats;
use crate::render::future::{Promise, RenderFuture};
use crate::render::gpu_memory::MemoryStats;
use crate::render::picking::{self, PickHit};
use crate::render::proxy::ProxyScene;
use crate::render::renderables::RenderableList;
use crate::render::visibility::{ViewId, WindowId};
use crate::render::{FatalError, Image, RenderError, RenderResult};
use crossbeam_channel::{unbounded, Sender};
use render_thread::RenderThread;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

/// Cached resource to drop on the render thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreeRequest {
    /// Mesh prototype and its parsed data
    Mesh(MeshProtoKey),
    /// Uploaded texture
    Texture(TextureKey),
}

struct OffscreenRequest {
    scene: ProxyScene,
    camera: CameraInfo,
    width: u32,
    height: u32,
    reply: Promise<Image>,
}

enum Message {
    CreateWindow {
        id: WindowId,
        desc: WindowDesc,
        reply: Promise<WindowId>,
    },
    CloseWindow(WindowId),
    SetCameraInfo(WindowId, CameraInfo),
    Offscreen(OffscreenRequest),
    Free(FreeRequest),
    Sync(Promise<()>),
}

#[derive(Default)]
struct SceneSlot {
    scene: Option<Arc<ProxyScene>>,
    generation: u64,
}

/// State shared between the handle and the render thread
struct Shared {
    config: RendererConfig,
    cos_half_angle: f32,
    scene: Mutex<SceneSlot>,
    list: RwLock<Arc<RenderableList>>,
    sender: Sender<Message>,
    redraw: Arc<RedrawSignal>,
    running: AtomicBool,
    ready: Completion<RenderResult<()>>,
    fatal: Mutex<Option<FatalError>>,
    next_window: AtomicU32,
    stats: Mutex<HashMap<ViewId, FrameStats>>,
    // Latest camera per open window, for distance-ranged picking
    cameras: Mutex<HashMap<WindowId, CameraInfo>>,
    memory: Mutex<MemoryStats>,
    mesh_data: Arc<MeshDataCache>,
    pool: Arc<LoaderPool>,
}

impl Shared {
    fn record_fatal(&self, fatal: FatalError) {
        log::error!("Render thread stopped: {}", fatal.message());
        let mut slot = lock(&self.fatal);
        if slot.is_none() {
            *slot = Some(fatal);
        }
    }
}

/// Configures and starts a [`Renderer`]
pub struct RendererBuilder {
    config: RendererConfig,
    geometry: Option<Arc<dyn GeometryLoader>>,
    textures: Option<Arc<dyn TextureDecoder>>,
    clock: Arc<dyn Clock>,
}

impl RendererBuilder {
    /// Parse geometry with `loader` instead of the OBJ loader
    #[must_use]
    pub fn geometry_loader(mut self, loader: impl GeometryLoader + 'static) -> Self {
        self.geometry = Some(Arc::new(loader));
        self
    }

    /// Decode images with `decoder` instead of the `image` crate decoder
    #[must_use]
    pub fn texture_decoder(mut self, decoder: impl TextureDecoder + 'static) -> Self {
        self.textures = Some(Arc::new(decoder));
        self
    }

    /// Time source for GPU memory reclamation
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the render thread
    ///
    /// `backend` runs on the render thread; an error from it (or from the
    /// rest of initialization) is fatal and reported by
    /// [`Renderer::wait_until_ready`] and [`Renderer::fatal_error`]. Only an
    /// invalid configuration or a failed thread spawn fails here.
    pub fn start<F>(self, backend: F) -> RenderResult<Renderer>
    where
        F: FnOnce() -> RenderResult<Box<dyn GpuBackend>> + Send + 'static,
    {
        self.config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let resolver = AssetResolver::new(self.config.assets.search_paths.clone());
        let geometry = self
            .geometry
            .unwrap_or_else(|| Arc::new(ObjLoader::new(resolver.clone())));
        let decoder = self
            .textures
            .unwrap_or_else(|| Arc::new(ImageDecoder::new(resolver)));

        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            cos_half_angle: utils::deg_to_rad(self.config.picking.cone_half_angle_degrees).cos(),
            pool: Arc::new(LoaderPool::new(self.config.textures.loader_threads)),
            config: self.config,
            scene: Mutex::new(SceneSlot::default()),
            list: RwLock::new(Arc::new(RenderableList::default())),
            sender,
            redraw: Arc::new(RedrawSignal::new()),
            running: AtomicBool::new(true),
            ready: Completion::new(),
            fatal: Mutex::new(None),
            next_window: AtomicU32::new(1),
            stats: Mutex::new(HashMap::new()),
            cameras: Mutex::new(HashMap::new()),
            memory: Mutex::new(MemoryStats::default()),
            mesh_data: Arc::new(MeshDataCache::new(geometry)),
        });

        let thread_shared = Arc::clone(&shared);
        let clock = self.clock;
        let handle = thread::Builder::new()
            .name(String::from("render"))
            .spawn(move || RenderThread::run(thread_shared, receiver, backend, decoder, clock))
            .map_err(|e| RenderError::InitializationFailed(format!("cannot spawn render thread: {e}")))?;

        log::info!("Renderer started");
        Ok(Renderer {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }
}

/// Handle to the render thread
///
/// Every method may be called from any thread. Dropping the handle shuts the
/// renderer down.
pub struct Renderer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Renderer {
    /// Builder with the given configuration and file-backed loaders
    pub fn builder(config: RendererConfig) -> RendererBuilder {
        RendererBuilder {
            config,
            geometry: None,
            textures: None,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Start with default loaders and the system clock
    pub fn start<F>(config: RendererConfig, backend: F) -> RenderResult<Self>
    where
        F: FnOnce() -> RenderResult<Box<dyn GpuBackend>> + Send + 'static,
    {
        Self::builder(config).start(backend)
    }

    /// Block until initialization finished; its error if it failed
    pub fn wait_until_ready(&self) -> RenderResult<()> {
        if is_render_thread() && !self.shared.ready.is_done() {
            return Err(RenderError::WouldDeadlock);
        }
        self.shared.ready.wait()
    }

    /// The error that stopped the render thread, if any
    pub fn fatal_error(&self) -> Option<FatalError> {
        lock(&self.shared.fatal).clone()
    }

    /// Whether the render thread is still running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Replace the scene; the last scene published before a frame wins
    pub fn set_scene(&self, scene: ProxyScene) {
        {
            let mut slot = lock(&self.shared.scene);
            slot.scene = Some(Arc::new(scene));
            slot.generation += 1;
        }
        self.shared.redraw.request();
    }

    fn post(&self, message: Message) -> RenderResult<()> {
        if !self.is_running() {
            return Err(RenderError::Shutdown);
        }
        // A rejected message drops its promise, which resolves as shut down
        self.shared.sender.send(message).map_err(|_| RenderError::Shutdown)?;
        self.shared.redraw.request();
        Ok(())
    }

    /// Open a window; blocks until the render thread created its context
    pub fn create_window(&self, desc: WindowDesc) -> RenderResult<WindowId> {
        let id = ViewId(self.shared.next_window.fetch_add(1, Ordering::Relaxed));
        let (future, reply) = RenderFuture::pending();
        self.post(Message::CreateWindow { id, desc, reply })?;
        let id = future.block_until_done()?;
        lock(&self.shared.cameras).insert(id, CameraInfo::default());
        Ok(id)
    }

    /// Close a window and drop its per-context GPU objects
    pub fn close_window(&self, id: WindowId) -> RenderResult<()> {
        lock(&self.shared.cameras).remove(&id);
        self.post(Message::CloseWindow(id))
    }

    /// Replace a window's camera
    pub fn set_camera_info(&self, id: WindowId, info: CameraInfo) -> RenderResult<()> {
        if let Some(camera) = lock(&self.shared.cameras).get_mut(&id) {
            *camera = info.clone();
        }
        self.post(Message::SetCameraInfo(id, info))
    }

    /// Render `scene` into a `width` by `height` image off screen
    ///
    /// Resolved on the render thread after drawing and readback. Blocking on
    /// the result from the render thread fails with
    /// [`RenderError::WouldDeadlock`].
    pub fn render_offscreen(&self, scene: ProxyScene, camera: CameraInfo, width: u32, height: u32) -> RenderFuture<Image> {
        let (future, reply) = RenderFuture::pending();
        let request = OffscreenRequest {
            scene,
            camera,
            width,
            height,
            reply,
        };
        if let Err(e) = self.post(Message::Offscreen(request)) {
            log::debug!("Offscreen request rejected: {}", e);
        }
        future
    }

    /// Ask the render thread to drop a cached resource
    pub fn free_resource(&self, request: FreeRequest) -> RenderResult<()> {
        self.post(Message::Free(request))
    }

    /// Start parsing a mesh in the background
    ///
    /// Returns false if it is already loaded or loading.
    pub fn prefetch(&self, key: &MeshProtoKey) -> bool {
        self.shared.mesh_data.load_async(key, &self.shared.pool)
    }

    /// Ask for a frame even though nothing changed
    pub fn request_redraw(&self) {
        self.shared.redraw.request();
    }

    /// Future resolved once a full frame has been drawn after this call
    ///
    /// Anything published or posted before `sync` is visible in that frame.
    pub fn sync(&self) -> RenderFuture<()> {
        let (future, reply) = RenderFuture::pending();
        if let Err(e) = self.post(Message::Sync(reply)) {
            log::debug!("Sync rejected: {}", e);
        }
        future
    }

    /// Pickable objects hit by a world ray in `view`, nearest first
    ///
    /// Rough picks test convex hulls; precise picks test triangles, and
    /// segments or points within the configured cone. Objects outside their
    /// distance range from the window's camera are skipped as in drawing.
    pub fn pick(&self, ray: &Ray, view: ViewId, precise: bool) -> Vec<PickHit> {
        let camera = lock(&self.shared.cameras).get(&view).cloned();
        let list = read(&self.shared.list);
        picking::pick(&list, ray, view, camera.as_ref(), precise, self.shared.cos_half_angle)
    }

    /// Nearest pickable object hit by a world ray, if any
    pub fn pick_nearest(&self, ray: &Ray, view: ViewId, precise: bool) -> Option<PickHit> {
        self.pick(ray, view, precise).into_iter().next()
    }

    /// Picking ids of the overlays under a pixel of `view`, topmost first
    pub fn overlay_pick(&self, x: f32, y: f32, view: ViewId) -> Vec<u32> {
        let list = read(&self.shared.list);
        picking::overlay_pick(&list, x, y, view)
    }

    /// Counters of the last frame drawn for a window
    pub fn last_frame_stats(&self, view: ViewId) -> Option<FrameStats> {
        lock(&self.shared.stats).get(&view).copied()
    }

    /// GPU memory use as of the last frame
    pub fn memory_stats(&self) -> MemoryStats {
        *lock(&self.shared.memory)
    }

    /// Snapshot of the current renderable list
    pub fn renderables(&self) -> Arc<RenderableList> {
        Arc::clone(&read(&self.shared.list))
    }

    /// Stop the render thread, free every GPU resource and join
    ///
    /// Pending futures resolve with [`RenderError::Shutdown`]. Idempotent.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.redraw.request();
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Render thread panicked during shutdown");
            }
            log::info!("Renderer shut down");
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
