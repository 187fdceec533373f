//! Integration tests driving a full renderer on the headless backend

use approx::assert_relative_eq;
use rust_renderer::foundation::logging;
use rust_renderer::foundation::math::utils;
use rust_renderer::prelude::*;
use rust_renderer::render::backends::HeadlessProbe;
use rust_renderer::render::{
    BufferUsage, ContextId, DrawCall, GpuId, OverlayContent, OverlayDraw, RenderTarget, TextureDesc,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Loader handing out unit cubes and recording every parse
#[derive(Clone, Default)]
struct CubeLoader {
    parsed: Arc<Mutex<Vec<String>>>,
}

impl CubeLoader {
    fn parses_of(&self, uri: &str) -> usize {
        self.parsed.lock().unwrap().iter().filter(|u| *u == uri).count()
    }
}

impl rust_renderer::assets::GeometryLoader for CubeLoader {
    fn parse(&self, uri: &str) -> Result<MeshData, AssetError> {
        self.parsed.lock().unwrap().push(uri.to_string());
        Ok(MeshData::placeholder_cube())
    }
}

fn start_with(loader: impl rust_renderer::assets::GeometryLoader + 'static) -> (Renderer, HeadlessProbe) {
    start_on(RendererConfig::default(), loader, HeadlessBackend::new())
}

fn start_on(
    config: RendererConfig,
    loader: impl rust_renderer::assets::GeometryLoader + 'static,
    backend: HeadlessBackend,
) -> (Renderer, HeadlessProbe) {
    let probe = backend.probe();
    let renderer = start_boxed(config, loader, move || Box::new(backend) as Box<dyn GpuBackend>);
    (renderer, probe)
}

fn start_boxed<F>(config: RendererConfig, loader: impl rust_renderer::assets::GeometryLoader + 'static, backend: F) -> Renderer
where
    F: FnOnce() -> Box<dyn GpuBackend> + Send + 'static,
{
    logging::init_for_tests();
    let renderer = Renderer::builder(config)
        .geometry_loader(loader)
        .texture_decoder(|_: &str| Ok::<_, AssetError>(DecodedImage::solid_color(4, 4, [0, 255, 0, 255])))
        .start(move || Ok(backend()))
        .unwrap();
    renderer.wait_until_ready().unwrap();
    renderer
}

/// Headless backend that panics on selected calls
///
/// Presenting a context titled "broken" panics, as does creating a context
/// titled "explode" or a 13 pixel wide offscreen target.
struct PanickyBackend {
    inner: HeadlessBackend,
    broken: HashSet<ContextId>,
}

impl PanickyBackend {
    fn new(inner: HeadlessBackend) -> Self {
        Self {
            inner,
            broken: HashSet::new(),
        }
    }
}

impl GpuBackend for PanickyBackend {
    fn name(&self) -> &str {
        "panicky"
    }

    fn create_context(&mut self, desc: &WindowDesc) -> RenderResult<ContextId> {
        assert_ne!(desc.title, "explode", "context creation blew up");
        let context = self.inner.create_context(desc)?;
        if desc.title == "broken" {
            self.broken.insert(context);
        }
        Ok(context)
    }

    fn destroy_context(&mut self, context: ContextId) {
        self.broken.remove(&context);
        self.inner.destroy_context(context);
    }

    fn make_current(&mut self, context: ContextId) -> RenderResult<()> {
        self.inner.make_current(context)
    }

    fn surface_size(&self, context: ContextId) -> RenderResult<(u32, u32)> {
        self.inner.surface_size(context)
    }

    fn present(&mut self, context: ContextId) -> RenderResult<()> {
        assert!(!self.broken.contains(&context), "swap chain lost");
        self.inner.present(context)
    }

    fn create_buffer(&mut self, usage: BufferUsage, data: &[u8]) -> RenderResult<GpuId> {
        self.inner.create_buffer(usage, data)
    }

    fn delete_buffer(&mut self, id: GpuId) {
        self.inner.delete_buffer(id);
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<GpuId> {
        self.inner.create_texture(desc, data)
    }

    fn delete_texture(&mut self, id: GpuId) {
        self.inner.delete_texture(id);
    }

    fn create_vertex_array(&mut self, context: ContextId, vertex_buffer: GpuId, index_buffer: GpuId) -> RenderResult<GpuId> {
        self.inner.create_vertex_array(context, vertex_buffer, index_buffer)
    }

    fn delete_vertex_array(&mut self, context: ContextId, id: GpuId) {
        self.inner.delete_vertex_array(context, id);
    }

    fn begin_pass(&mut self, target: RenderTarget, size: (u32, u32), clear_color: [f32; 4]) -> RenderResult<()> {
        self.inner.begin_pass(target, size, clear_color)
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        self.inner.draw(call)
    }

    fn draw_skybox(&mut self, texture: GpuId, view: &Mat4, projection: &Mat4) -> RenderResult<()> {
        self.inner.draw_skybox(texture, view, projection)
    }

    fn draw_overlay(&mut self, overlay: &OverlayDraw) -> RenderResult<()> {
        self.inner.draw_overlay(overlay)
    }

    fn create_offscreen_target(&mut self, width: u32, height: u32) -> RenderResult<GpuId> {
        assert_ne!(width, 13, "offscreen target blew up");
        self.inner.create_offscreen_target(width, height)
    }

    fn delete_offscreen_target(&mut self, id: GpuId) {
        self.inner.delete_offscreen_target(id);
    }

    fn read_pixels(&mut self, target: GpuId) -> RenderResult<Vec<u8>> {
        self.inner.read_pixels(target)
    }
}

fn open_window(renderer: &Renderer) -> WindowId {
    let window = renderer.create_window(WindowDesc::new("test", 640, 480)).unwrap();
    renderer
        .set_camera_info(window, CameraInfo::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y()))
        .unwrap();
    window
}

fn cube(uri: &str, id: u32, at: Vec3) -> RenderProxy {
    RenderProxy::mesh(uri)
        .with_transform(Mat4::new_translation(&at))
        .with_picking_id(id)
}

fn frame(renderer: &Renderer) {
    renderer.sync().block_until_done().unwrap();
}

#[test]
fn test_only_last_scene_before_frame_is_rendered() {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();
    let parsed = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&parsed);
    // Parsing "gate.obj" parks the render thread until released
    let loader = move |uri: &str| {
        record.lock().unwrap().push(uri.to_string());
        if uri == "gate.obj" {
            entered_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }
        Ok::<_, AssetError>(MeshData::placeholder_cube())
    };
    let (renderer, probe) = start_with(loader);
    open_window(&renderer);
    let context = probe.window_contexts()[0];

    let mut gate = ProxyScene::new();
    gate.push(cube("gate.obj", 99, Vec3::zeros()));
    renderer.set_scene(gate);
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let mut a = ProxyScene::new();
    a.push(cube("a.obj", 1, Vec3::zeros()));
    let mut b = ProxyScene::new();
    b.push(cube("b.obj", 2, Vec3::zeros()));
    renderer.set_scene(a);
    renderer.set_scene(b);
    release_tx.send(()).unwrap();
    frame(&renderer);

    let parsed = parsed.lock().unwrap().clone();
    assert!(!parsed.contains(&String::from("a.obj")));
    assert!(parsed.contains(&String::from("b.obj")));
    let ids: Vec<_> = renderer.renderables().items.iter().map(|i| i.picking_id).collect();
    assert_eq!(ids, vec![Some(2)]);
    assert_eq!(probe.last_pass_objects(RenderTarget::Window(context)), Some(vec![Some(2)]));
}

#[test]
fn test_pick_nearest_first_and_idempotent() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene
        .push(cube("cube.obj", 1, Vec3::new(0.0, 0.0, -5.0)))
        .push(cube("cube.obj", 2, Vec3::zeros()))
        .push(RenderProxy::mesh("cube.obj").with_transform(Mat4::new_translation(&Vec3::new(0.0, 0.0, 3.0))));
    renderer.set_scene(scene);
    frame(&renderer);

    let ray = Ray::new(Vec3::new(0.1, 0.2, 10.0), Vec3::new(0.0, 0.0, -1.0));
    let hits = renderer.pick(&ray, window, true);
    assert_eq!(hits.iter().map(|h| h.picking_id).collect::<Vec<_>>(), vec![2, 1]);
    assert_relative_eq!(hits[0].distance, 9.5, epsilon = 1e-4);
    assert_eq!(renderer.pick(&ray, window, true), hits);

    let rough = renderer.pick_nearest(&ray, window, false).unwrap();
    assert_eq!(rough.picking_id, 2);
    assert_relative_eq!(rough.distance, 9.5, epsilon = 1e-4);
}

#[test]
fn test_bounds_hit_without_geometry_hit_is_no_hit() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    // Rotated about Z the cube is a diamond; its world box has empty corners
    let rotated = Mat4::new_rotation(Vec3::new(0.0, 0.0, utils::deg_to_rad(45.0)));
    let mut scene = ProxyScene::new();
    scene.push(RenderProxy::mesh("cube.obj").with_transform(rotated).with_picking_id(5));
    renderer.set_scene(scene);
    frame(&renderer);

    let corner = Ray::new(Vec3::new(0.6, 0.6, 10.0), Vec3::new(0.0, 0.0, -1.0));
    assert!(renderer.pick_nearest(&corner, window, true).is_none());
    assert!(renderer.pick_nearest(&corner, window, false).is_none());

    let center = Ray::new(Vec3::new(0.1, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
    assert_eq!(renderer.pick_nearest(&center, window, true).unwrap().picking_id, 5);
}

#[test]
fn test_offscreen_render_reads_back_image() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let mut scene = ProxyScene::new();
    scene.push(cube("cube.obj", 1, Vec3::zeros()));
    scene.push_overlay(OverlayProxy::colored([0.0, 0.0, 2.0, 2.0], [1.0, 0.0, 0.0, 1.0]));
    let camera = CameraInfo::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());

    let image = renderer.render_offscreen(scene, camera, 8, 4).block_until_done().unwrap();
    assert_eq!((image.width, image.height), (8, 4));
    assert_eq!(&image.rgba[0..4], &[255, 0, 0, 255]);
    // Outside the overlay: default clear color
    assert_eq!(&image.rgba[(3 * 8 + 7) * 4..], &[0, 0, 0, 255]);
}

#[test]
fn test_offscreen_with_empty_size_reports_error() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let result = renderer
        .render_offscreen(ProxyScene::new(), CameraInfo::default(), 0, 16)
        .block_until_done();
    assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
}

#[test]
fn test_backend_init_failure_is_fatal() {
    logging::init_for_tests();
    let renderer = Renderer::start(RendererConfig::default(), || {
        Err(RenderError::InitializationFailed(String::from("no adapter")))
    })
    .unwrap();

    assert!(matches!(renderer.wait_until_ready(), Err(RenderError::InitializationFailed(_))));
    let fatal = renderer.fatal_error().unwrap();
    assert!(fatal.message().contains("no adapter"));
    assert!(!renderer.is_running());
    assert!(matches!(
        renderer.create_window(WindowDesc::new("late", 10, 10)),
        Err(RenderError::Shutdown)
    ));
    assert!(matches!(renderer.sync().block_until_done(), Err(RenderError::Shutdown)));
}

#[test]
fn test_invalid_config_is_rejected_up_front() {
    let mut config = RendererConfig::default();
    config.textures.loader_threads = 0;
    let result = Renderer::start(config, || Ok(Box::new(HeadlessBackend::new()) as Box<dyn GpuBackend>));
    assert!(matches!(result, Err(RenderError::InitializationFailed(_))));
}

#[test]
fn test_texture_streams_in_and_keeps_its_id() {
    let (renderer, probe) = start_with(CubeLoader::default());
    open_window(&renderer);
    let key = TextureKey::new("grass.png", TexFlags::empty());
    let mut scene = ProxyScene::new();
    scene.push(RenderProxy::new(ProxyKind::TextureQuad {
        texture: key,
        size: [2.0, 2.0],
        color: [1.0; 4],
    }));
    renderer.set_scene(scene);

    // Loading and placeholder textures exist from the start
    let mut uploaded = false;
    for _ in 0..200 {
        frame(&renderer);
        if probe.live_textures() == 3 {
            uploaded = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(uploaded);

    let before = renderer.memory_stats();
    frame(&renderer);
    frame(&renderer);
    assert_eq!(probe.live_textures(), 3);
    assert_eq!(renderer.memory_stats().textures, before.textures);
}

#[test]
fn test_free_mesh_reparses_on_next_use() {
    let loader = CubeLoader::default();
    let (renderer, _probe) = start_with(loader.clone());
    open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene.push(cube("ship.obj", 1, Vec3::zeros()));
    renderer.set_scene(scene);
    frame(&renderer);
    assert_eq!(loader.parses_of("ship.obj"), 1);

    renderer.free_resource(FreeRequest::Mesh(MeshProtoKey::new("ship.obj"))).unwrap();
    frame(&renderer);
    frame(&renderer);
    assert_eq!(loader.parses_of("ship.obj"), 2);
    assert_eq!(renderer.renderables().items.len(), 1);
}

#[test]
fn test_frame_stats_count_culled_objects() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene
        .push(cube("cube.obj", 1, Vec3::zeros()))
        .push(cube("cube.obj", 2, Vec3::new(0.0, 0.0, 50.0)))
        .push(cube("cube.obj", 3, Vec3::new(0.0, 0.0, -5.0)).with_visibility(VisibilityInfo::only_in([ViewId(999)])));
    renderer.set_scene(scene);
    frame(&renderer);

    let stats = renderer.last_frame_stats(window).unwrap();
    assert_eq!(stats.objects, 2);
    assert_eq!(stats.frustum_culled, 1);
    assert_eq!(stats.draw_calls, 1);
}

#[test]
fn test_overlay_pick_through_renderer() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene
        .push_overlay(OverlayProxy::colored([0.0, 0.0, 100.0, 40.0], [0.2; 4]).with_picking_id(10))
        .push_overlay(OverlayProxy {
            rect: [20.0, 10.0, 30.0, 30.0],
            content: OverlayContent::Texture {
                texture: TextureKey::new("icon.png", TexFlags::CLAMP),
                tint: [1.0; 4],
            },
            picking_id: Some(11),
            visibility: VisibilityInfo::everywhere(),
        });
    renderer.set_scene(scene);
    frame(&renderer);

    assert_eq!(renderer.overlay_pick(25.0, 20.0, window), vec![11, 10]);
    assert_eq!(renderer.overlay_pick(5.0, 5.0, window), vec![10]);
    assert!(renderer.overlay_pick(5.0, 300.0, window).is_empty());
}

#[test]
fn test_close_window_and_shutdown_release_everything() {
    let (renderer, probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene.push(cube("cube.obj", 1, Vec3::zeros())).push(RenderProxy::new(ProxyKind::DebugLines {
        segments: vec![[[0.0; 3], [1.0, 1.0, 1.0]]],
        color: [1.0, 1.0, 0.0, 1.0],
    }));
    renderer.set_scene(scene);
    frame(&renderer);
    assert_eq!(probe.window_contexts().len(), 1);
    assert!(probe.live_vertex_arrays() >= 2);

    renderer.close_window(window).unwrap();
    frame(&renderer);
    assert!(probe.window_contexts().is_empty());
    assert_eq!(probe.live_vertex_arrays(), 0);
    assert!(renderer.last_frame_stats(window).is_none());
    // Messages for a closed window are dropped on the render thread
    renderer.set_camera_info(window, CameraInfo::default()).unwrap();
    frame(&renderer);

    renderer.shutdown();
    assert_eq!(probe.live_buffers(), 0);
    assert_eq!(probe.live_textures(), 0);
    assert_eq!(probe.live_contexts(), 0);
    assert!(matches!(renderer.sync().block_until_done(), Err(RenderError::Shutdown)));
}

#[test]
fn test_obj_files_load_through_search_paths() {
    logging::init_for_tests();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("square.obj"),
        "v -1 -1 0\nv 1 -1 0\nv 1 1 0\nv -1 1 0\nf 1 2 3 4\n",
    )
    .unwrap();
    let mut config = RendererConfig::default();
    config.assets.search_paths = vec![dir.path().to_path_buf()];

    let renderer = Renderer::start(config, || Ok(Box::new(HeadlessBackend::new()) as Box<dyn GpuBackend>)).unwrap();
    renderer.wait_until_ready().unwrap();
    assert!(renderer.prefetch(&MeshProtoKey::new("square.obj")));

    let mut scene = ProxyScene::new();
    scene.push(RenderProxy::mesh("square.obj").with_picking_id(3));
    renderer.set_scene(scene);
    renderer.sync().block_until_done().unwrap();

    let ray = Ray::new(Vec3::new(0.3, -0.2, 5.0), Vec3::new(0.0, 0.0, -1.0));
    let hit = renderer.pick_nearest(&ray, ViewId(1), true).unwrap();
    assert_eq!(hit.picking_id, 3);
    assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-5);
}

#[test]
fn test_cone_picks_segment_and_point_near_the_ray() {
    let mut config = RendererConfig::default();
    config.picking.cone_half_angle_degrees = 1.0;
    let (renderer, _probe) = start_on(config, CubeLoader::default(), HeadlessBackend::new());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene
        .push(
            RenderProxy::new(ProxyKind::DebugLines {
                segments: vec![[[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]],
                color: [1.0; 4],
            })
            .with_picking_id(1),
        )
        .push(
            RenderProxy::new(ProxyKind::DebugPoints {
                points: vec![[0.0, 0.0, 0.0]],
                color: [1.0; 4],
            })
            .with_picking_id(2),
        );
    renderer.set_scene(scene);
    frame(&renderer);

    let ray = Ray::new(Vec3::new(0.0, 0.05, 10.0), Vec3::new(0.0, 0.0, -1.0));
    let ids: Vec<u32> = renderer.pick(&ray, window, true).iter().map(|h| h.picking_id).collect();
    assert_eq!(ids, vec![1, 2]);

    let wide = Ray::new(Vec3::new(0.0, 1.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
    assert!(renderer.pick(&wide, window, true).is_empty());
}

#[test]
fn test_pick_honors_distance_range_of_window_camera() {
    let (renderer, _probe) = start_with(CubeLoader::default());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene.push(cube("cube.obj", 4, Vec3::zeros()).with_visibility(VisibilityInfo::everywhere().with_distance_range(0.0, 20.0)));
    renderer.set_scene(scene);
    frame(&renderer);

    let ray = Ray::new(Vec3::new(0.1, 0.2, 10.0), Vec3::new(0.0, 0.0, -1.0));
    assert_eq!(renderer.pick_nearest(&ray, window, true).map(|h| h.picking_id), Some(4));

    renderer
        .set_camera_info(window, CameraInfo::looking_at(Vec3::new(0.0, 0.0, 50.0), Vec3::zeros(), Vec3::y()))
        .unwrap();
    assert!(renderer.pick_nearest(&ray, window, true).is_none());
    frame(&renderer);
    assert_eq!(renderer.last_frame_stats(window).unwrap().draw_calls, 0);
}

#[test]
fn test_mesh_upload_out_of_memory_draws_placeholder() {
    let (fresh, fresh_gpu) = start_with(CubeLoader::default());
    let builtins = fresh_gpu.bytes_in_use();
    fresh.shutdown();

    let loader = CubeLoader::default();
    let backend = HeadlessBackend::new().with_memory_budget(builtins);
    let (renderer, probe) = start_on(RendererConfig::default(), loader.clone(), backend);
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene.push(cube("ship.obj", 1, Vec3::zeros()));
    renderer.set_scene(scene.clone());
    frame(&renderer);

    assert_eq!(renderer.renderables().items.len(), 1);
    assert_eq!(renderer.last_frame_stats(window).unwrap().draw_calls, 1);
    assert_eq!(probe.bytes_in_use(), builtins);

    // A new scene generation keeps the placeholder instead of retrying
    renderer.set_scene(scene);
    frame(&renderer);
    frame(&renderer);
    assert_eq!(renderer.renderables().items.len(), 1);
    assert_eq!(probe.bytes_in_use(), builtins);
    assert_eq!(loader.parses_of("ship.obj"), 1);
    assert!(renderer.fatal_error().is_none());
}

#[test]
fn test_panics_stay_inside_their_window_message_and_request() {
    let renderer = start_boxed(RendererConfig::default(), CubeLoader::default(), || {
        Box::new(PanickyBackend::new(HeadlessBackend::new())) as Box<dyn GpuBackend>
    });
    let broken = renderer.create_window(WindowDesc::new("broken", 64, 64)).unwrap();
    let fine = renderer.create_window(WindowDesc::new("fine", 64, 64)).unwrap();
    let mut scene = ProxyScene::new();
    scene.push(cube("cube.obj", 1, Vec3::new(0.0, 0.0, -10.0)));
    renderer.set_scene(scene);
    frame(&renderer);

    assert!(renderer.last_frame_stats(broken).is_none());
    assert!(renderer.last_frame_stats(fine).is_some());

    assert!(renderer.create_window(WindowDesc::new("explode", 64, 64)).is_err());
    let offscreen = renderer
        .render_offscreen(ProxyScene::new(), CameraInfo::default(), 13, 4)
        .block_until_done();
    assert!(matches!(offscreen, Err(RenderError::RenderingFailed(_))));

    let before = renderer.last_frame_stats(fine).unwrap().frame;
    frame(&renderer);
    assert!(renderer.last_frame_stats(fine).unwrap().frame > before);
    assert!(renderer.is_running());
    assert!(renderer.fatal_error().is_none());
}

#[test]
fn test_idle_timeout_does_not_draw() {
    let mut config = RendererConfig::default();
    config.idle_wait_millis = 10;
    let (renderer, probe) = start_on(config, CubeLoader::default(), HeadlessBackend::new());
    let window = open_window(&renderer);
    let mut scene = ProxyScene::new();
    scene.push(cube("cube.obj", 1, Vec3::zeros()));
    renderer.set_scene(scene);
    frame(&renderer);

    let presents = probe.presents();
    let drawn = renderer.last_frame_stats(window).unwrap().frame;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(probe.presents(), presents);
    assert_eq!(renderer.last_frame_stats(window).unwrap().frame, drawn);

    renderer.request_redraw();
    frame(&renderer);
    assert!(probe.presents() > presents);
}
