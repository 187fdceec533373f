//! The render thread: owns the backend and every GPU cache

use super::{FreeRequest, Message, OffscreenRequest, Shared};
use crate::assets::TextureDecoder;
use crate::config::CullingConfig;
use crate::foundation::sync::{catch_panic, lock, mark_render_thread, read, write};
use crate::foundation::time::Clock;
use crate::geometry::BoundingSphere;
use crate::render::backend::{ContextId, GpuBackend, GpuId, OverlayDraw, RenderTarget, WindowDesc};
use crate::render::camera::{Camera, CameraInfo};
use crate::render::frame::{FrameContext, FrameStats};
use crate::render::future::Promise;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProtoCache;
use crate::render::proxy::{OverlayContent, OverlayProxy, ProxyKind, ProxyScene};
use crate::render::renderables::{RenderItem, RenderableCache, RenderableList};
use crate::render::texture_cache::TexCache;
use crate::render::visibility::{ViewId, WindowId};
use crate::render::{FatalError, Image, RenderError, RenderResult};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct Window {
    context: ContextId,
    camera: Camera,
}

pub(super) struct RenderThread {
    shared: Arc<Shared>,
    receiver: Receiver<Message>,
    backend: Box<dyn GpuBackend>,
    mem: GraphicsMemManager,
    textures: TexCache,
    protos: MeshProtoCache,
    renderables: RenderableCache,
    shared_context: ContextId,
    windows: BTreeMap<WindowId, Window>,
    scene_generation: u64,
    force_rebuild: bool,
    offscreen: Vec<OffscreenRequest>,
    // Drained this iteration; resolved at the end of the next one
    pending_syncs: Vec<Promise<()>>,
}

impl RenderThread {
    /// Thread entry point
    pub(super) fn run<F>(
        shared: Arc<Shared>,
        receiver: Receiver<Message>,
        backend: F,
        decoder: Arc<dyn TextureDecoder>,
        clock: Arc<dyn Clock>,
    ) where
        F: FnOnce() -> RenderResult<Box<dyn GpuBackend>>,
    {
        mark_render_thread();

        let init = catch_panic(|| Self::init(Arc::clone(&shared), receiver, backend, decoder, clock))
            .unwrap_or_else(|message| Err(RenderError::InitializationFailed(format!("panic: {message}"))));

        let mut this = match init {
            Ok(this) => this,
            Err(e) => {
                shared.record_fatal(FatalError::capture(e.to_string()));
                shared.running.store(false, Ordering::Release);
                shared.ready.complete(Err(e));
                return;
            }
        };
        log::info!("Render thread running on {}", this.backend.name());
        shared.ready.complete(Ok(()));

        let idle = Duration::from_millis(shared.config.idle_wait_millis);
        let mut woken = true;
        while shared.running.load(Ordering::Acquire) {
            let draw = shared.redraw.take() || woken;
            // Messages, windows, proxies and offscreen requests catch their
            // own panics; one escaping here came from the backend or caches
            let step = catch_panic(|| {
                if draw {
                    this.iteration();
                } else {
                    this.housekeeping();
                }
            });
            if let Err(message) = step {
                shared.record_fatal(FatalError::capture(format!("render loop panicked: {message}")));
                shared.running.store(false, Ordering::Release);
                break;
            }
            woken = !this.pending_syncs.is_empty() || shared.redraw.wait(idle);
        }

        if let Err(message) = catch_panic(|| this.teardown()) {
            log::error!("Render thread teardown panicked: {}", message);
        }
    }

    fn init<F>(
        shared: Arc<Shared>,
        receiver: Receiver<Message>,
        backend: F,
        decoder: Arc<dyn TextureDecoder>,
        clock: Arc<dyn Clock>,
    ) -> RenderResult<Self>
    where
        F: FnOnce() -> RenderResult<Box<dyn GpuBackend>>,
    {
        let mut backend = backend()?;
        let shared_context = backend.create_context(&WindowDesc::hidden())?;
        backend.make_current(shared_context)?;

        let mut mem = GraphicsMemManager::new(clock, shared.config.memory.clone());
        let redraw = Arc::clone(&shared.redraw);
        let textures = match TexCache::new(
            decoder,
            Arc::clone(&shared.pool),
            shared.config.textures.force_compress_above_pixels,
            Arc::new(move || redraw.request()),
            backend.as_mut(),
            &mut mem,
        ) {
            Ok(textures) => textures,
            Err(e) => {
                mem.free_all(backend.as_mut());
                backend.destroy_context(shared_context);
                return Err(e);
            }
        };

        let protos = match MeshProtoCache::new(Arc::clone(&shared.mesh_data), backend.as_mut(), &mut mem) {
            Ok(protos) => protos,
            Err(e) => {
                mem.free_all(backend.as_mut());
                backend.destroy_context(shared_context);
                return Err(e);
            }
        };

        Ok(Self {
            protos,
            shared,
            receiver,
            backend,
            mem,
            textures,
            renderables: RenderableCache::new(),
            shared_context,
            windows: BTreeMap::new(),
            scene_generation: 0,
            force_rebuild: false,
            offscreen: Vec::new(),
            pending_syncs: Vec::new(),
        })
    }

    fn iteration(&mut self) {
        self.mem.tick_frame();
        self.housekeeping();

        self.rebuild_if_needed();

        let armed = std::mem::take(&mut self.pending_syncs);
        self.drain_messages();
        // Freed resources invalidate the renderables built on them
        self.rebuild_if_needed();

        self.render_windows();
        self.serve_offscreen();

        for sync in armed {
            sync.fulfil(Ok(()));
        }
        *lock(&self.shared.memory) = self.mem.stats();
    }

    /// Eviction and texture uploads; runs on idle wake-ups without drawing
    fn housekeeping(&mut self) {
        let reclaimed = self.mem.free_old_resources(self.backend.as_mut());
        if reclaimed > 0 {
            log::debug!("Reclaimed {} idle GPU resources", reclaimed);
        }
        self.textures.poll(self.backend.as_mut(), &mut self.mem);
    }

    fn rebuild_if_needed(&mut self) {
        let (scene, generation) = {
            let slot = lock(&self.shared.scene);
            (slot.scene.clone(), slot.generation)
        };
        let stale = read(&self.shared.list).needs_rebuild();
        if generation == self.scene_generation && !stale && !self.force_rebuild {
            return;
        }
        self.force_rebuild = false;
        let Some(scene) = scene else {
            return;
        };

        self.renderables.begin_generation();
        let items = self.resolve_items(&scene);
        self.renderables.end_generation(self.backend.as_mut(), &mut self.mem);

        log::debug!("Scene {} resolved to {} renderables", generation, items.len());
        *write(&self.shared.list) = Arc::new(RenderableList {
            items,
            overlays: scene.overlays.clone(),
            generation,
        });
        self.scene_generation = generation;
    }

    fn resolve_items(&mut self, scene: &ProxyScene) -> Vec<RenderItem> {
        let mut items = Vec::with_capacity(scene.proxies.len());
        for proxy in &scene.proxies {
            let resolved = catch_panic(|| {
                self.renderables
                    .resolve(proxy, &mut self.protos, self.backend.as_mut(), &mut self.mem)
            });
            match resolved {
                Ok(Ok(renderable)) => items.push(RenderItem::new(renderable, proxy)),
                Ok(Err(e)) => log::warn!("Skipping proxy {:?}: {}", proxy.key(), e),
                Err(message) => log::error!("Skipping proxy {:?}: panicked: {}", proxy.key(), message),
            }
        }
        items
    }

    fn drain_messages(&mut self) {
        let messages: Vec<Message> = self.receiver.try_iter().collect();
        for message in messages {
            match catch_panic(|| self.apply(message)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Render message failed: {}", e),
                Err(message) => log::error!("Render message panicked: {}", message),
            }
        }
    }

    fn apply(&mut self, message: Message) -> RenderResult<()> {
        match message {
            Message::CreateWindow { id, desc, reply } => {
                let result = self.open_window(id, &desc);
                reply.fulfil(result.clone().map(|()| id));
                result
            }
            Message::CloseWindow(id) => self.close_window(id),
            Message::SetCameraInfo(id, info) => {
                let window = self.windows.get_mut(&id).ok_or(RenderError::UnknownWindow(id))?;
                window.camera.set_info(info);
                Ok(())
            }
            Message::Offscreen(request) => {
                self.offscreen.push(request);
                Ok(())
            }
            Message::Free(FreeRequest::Mesh(key)) => {
                self.renderables
                    .forget(&ProxyKind::Mesh(key.clone()), self.backend.as_mut(), &mut self.mem);
                self.protos.remove(&key, self.backend.as_mut(), &mut self.mem);
                self.shared.mesh_data.remove(&key);
                self.force_rebuild = true;
                log::debug!("Freed mesh {}", key);
                Ok(())
            }
            Message::Free(FreeRequest::Texture(key)) => {
                self.textures.remove(&key, self.backend.as_mut(), &mut self.mem);
                log::debug!("Freed texture {}", key);
                Ok(())
            }
            Message::Sync(reply) => {
                self.pending_syncs.push(reply);
                Ok(())
            }
        }
    }

    fn open_window(&mut self, id: WindowId, desc: &WindowDesc) -> RenderResult<()> {
        let context = self.backend.create_context(desc)?;
        let camera = Camera::new(CameraInfo::default(), (desc.width, desc.height));
        self.windows.insert(id, Window { context, camera });
        log::info!("Opened window {:?} \"{}\" ({}x{})", id, desc.title, desc.width, desc.height);
        Ok(())
    }

    fn close_window(&mut self, id: WindowId) -> RenderResult<()> {
        let window = self.windows.remove(&id).ok_or(RenderError::UnknownWindow(id))?;
        self.release_context(window.context);
        lock(&self.shared.stats).remove(&id);
        log::info!("Closed window {:?}", id);
        Ok(())
    }

    fn release_context(&mut self, context: ContextId) {
        self.renderables.release_context(context, self.backend.as_mut());
        self.protos.release_context(context, self.backend.as_mut());
        self.backend.destroy_context(context);
    }

    fn render_windows(&mut self) {
        let list = Arc::clone(&read(&self.shared.list));
        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        for id in ids {
            match catch_panic(|| self.render_window(id, &list)) {
                Ok(Ok(stats)) => {
                    lock(&self.shared.stats).insert(id, stats);
                }
                Ok(Err(e)) => log::warn!("Frame for window {:?} failed: {}", id, e),
                Err(message) => log::error!("Frame for window {:?} panicked: {}", id, message),
            }
        }
    }

    fn render_window(&mut self, id: WindowId, list: &RenderableList) -> RenderResult<FrameStats> {
        let window = self.windows.get_mut(&id).ok_or(RenderError::UnknownWindow(id))?;
        let context = window.context;
        self.backend.make_current(context)?;
        let size = self.backend.surface_size(context)?;
        window.camera.set_viewport(size);
        self.backend
            .begin_pass(RenderTarget::Window(context), size, self.shared.config.clear_color)?;

        let mut frame = FrameContext {
            backend: self.backend.as_mut(),
            mem: &self.mem,
            textures: &mut self.textures,
            context,
            view: window.camera.view(),
            projection: window.camera.projection(),
            log_depth: window.camera.log_depth(),
            draw_calls: 0,
        };
        let mut stats = draw_view(&mut frame, &mut window.camera, list, id, &self.shared.config.culling);
        stats.frame = self.mem.frame();

        self.backend.present(context)?;
        Ok(stats)
    }

    fn serve_offscreen(&mut self) {
        for request in std::mem::take(&mut self.offscreen) {
            let result = catch_panic(|| self.render_offscreen(&request))
                .unwrap_or_else(|message| Err(RenderError::RenderingFailed(format!("panic: {message}"))));
            if let Err(e) = &result {
                log::warn!("Offscreen render failed: {}", e);
            }
            request.reply.fulfil(result);
        }
    }

    fn render_offscreen(&mut self, request: &OffscreenRequest) -> RenderResult<Image> {
        let (width, height) = (request.width, request.height);
        self.backend
            .make_current(self.shared_context)
            .map_err(|e| RenderError::ContextUnavailable(e.to_string()))?;

        let list = RenderableList {
            items: self.resolve_items(&request.scene),
            overlays: request.scene.overlays.clone(),
            generation: self.scene_generation,
        };

        let target = self.backend.create_offscreen_target(width, height)?;
        let pixels = self.draw_offscreen(target, request, &list);
        self.backend.delete_offscreen_target(target);
        Ok(Image::new(width, height, pixels?)?)
    }

    fn draw_offscreen(&mut self, target: GpuId, request: &OffscreenRequest, list: &RenderableList) -> RenderResult<Vec<u8>> {
        let size = (request.width, request.height);
        let mut camera = Camera::new(request.camera.clone(), size);
        self.backend
            .begin_pass(RenderTarget::Offscreen(target), size, self.shared.config.clear_color)?;

        let mut frame = FrameContext {
            backend: self.backend.as_mut(),
            mem: &self.mem,
            textures: &mut self.textures,
            context: self.shared_context,
            view: camera.view(),
            projection: camera.projection(),
            log_depth: camera.log_depth(),
            draw_calls: 0,
        };
        let stats = draw_view(&mut frame, &mut camera, list, ViewId::OFFSCREEN, &self.shared.config.culling);
        log::debug!("Offscreen {}x{}: {} draw calls", size.0, size.1, stats.draw_calls);
        self.backend.read_pixels(target)
    }

    fn teardown(mut self) {
        // Undelivered requests resolve as shut down when dropped
        drop(std::mem::take(&mut self.offscreen));
        drop(std::mem::take(&mut self.pending_syncs));
        let messages: Vec<Message> = self.receiver.try_iter().collect();
        drop(messages);

        *write(&self.shared.list) = Arc::new(RenderableList::default());
        self.renderables.clear(self.backend.as_mut(), &mut self.mem);
        self.protos.clear(self.backend.as_mut(), &mut self.mem);
        self.mem.free_all(self.backend.as_mut());

        for (_, window) in std::mem::take(&mut self.windows) {
            self.backend.destroy_context(window.context);
        }
        self.backend.destroy_context(self.shared_context);
        *lock(&self.shared.memory) = self.mem.stats();
        log::info!("Render thread stopped");
    }
}

/// Cull and draw one view's content into the current pass
///
/// Individual renderables that fail to draw are logged and counted; the
/// rest of the view still renders.
fn draw_view(
    frame: &mut FrameContext<'_>,
    camera: &mut Camera,
    list: &RenderableList,
    view: ViewId,
    culling: &CullingConfig,
) -> FrameStats {
    let mut stats = FrameStats::default();

    if let Some(key) = camera.info().skybox.clone() {
        let drawn = frame.textures.resolve(&key).bind(frame.mem).and_then(|texture| {
            frame
                .backend
                .draw_skybox(texture, &frame.view, &frame.projection)
        });
        match drawn {
            Ok(()) => frame.draw_calls += 1,
            Err(e) => {
                log::warn!("Skybox {} failed: {}", key, e);
                stats.errors += 1;
            }
        }
    }

    let mut transparent: Vec<(f32, &RenderItem)> = Vec::new();
    for item in &list.items {
        if !item.visibility.in_view(view) {
            continue;
        }
        stats.objects += 1;
        if !camera.collides_aabb(&item.world_bounds) {
            stats.frustum_culled += 1;
            continue;
        }
        let distance = camera.dist_to_bounds(&item.world_bounds);
        if !item.visibility.in_range(distance) {
            continue;
        }
        if camera.pixel_size(&BoundingSphere::from_aabb(&item.world_bounds)) < culling.min_pixel_size {
            stats.size_culled += 1;
            continue;
        }
        if item.renderable.has_opaque() {
            if let Err(e) = item.renderable.render(frame, item) {
                log::warn!("Renderable {:?} failed: {}", item.key, e);
                stats.errors += 1;
            }
        }
        if item.renderable.has_transparent() {
            transparent.push((distance, item));
        }
    }

    // Farthest first
    transparent.sort_by(|a, b| b.0.total_cmp(&a.0));
    for (_, item) in transparent {
        match item.renderable.render_transparent(frame, item) {
            Ok(()) => stats.transparent += 1,
            Err(e) => {
                log::warn!("Renderable {:?} failed: {}", item.key, e);
                stats.errors += 1;
            }
        }
    }

    for overlay in list.overlays.iter().filter(|o| o.visibility.in_view(view)) {
        match draw_overlay(frame, overlay) {
            Ok(()) => {
                stats.overlays += 1;
                frame.draw_calls += 1;
            }
            Err(e) => {
                log::warn!("Overlay failed: {}", e);
                stats.errors += 1;
            }
        }
    }

    stats.draw_calls = frame.draw_calls;
    stats
}

fn draw_overlay(frame: &mut FrameContext<'_>, overlay: &OverlayProxy) -> RenderResult<()> {
    let (color, texture) = match &overlay.content {
        OverlayContent::Color(color) => (*color, None),
        OverlayContent::Texture { texture, tint } => {
            (*tint, Some(frame.textures.resolve(texture).bind(frame.mem)?))
        }
    };
    frame.backend.draw_overlay(&OverlayDraw {
        rect: overlay.rect,
        color,
        texture,
    })
}
