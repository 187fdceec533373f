//! In-memory backend
//!
//! Tracks every allocation and records every draw without touching a GPU.
//! Offscreen readback returns the clear color with overlay rectangles filled
//! in. An optional memory budget makes uploads fail with `OutOfMemory`.

use crate::foundation::math::Mat4;
use crate::foundation::sync::lock;
use crate::render::backend::{
    BufferUsage, ContextId, DrawCall, GpuBackend, GpuId, OverlayDraw, RenderTarget, TextureDesc,
    WindowDesc,
};
use crate::render::{RenderError, RenderResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Pass {
    target: Option<RenderTarget>,
    size: (u32, u32),
    clear_color: [f32; 4],
    objects: Vec<Option<u32>>,
    overlays: Vec<OverlayDraw>,
    skybox: Option<GpuId>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u32,
    contexts: HashMap<ContextId, WindowDesc>,
    current: Option<ContextId>,
    buffers: HashMap<GpuId, usize>,
    textures: HashMap<GpuId, usize>,
    vertex_arrays: HashMap<(ContextId, GpuId), (GpuId, GpuId)>,
    targets: HashMap<GpuId, (u32, u32)>,
    pixels: HashMap<GpuId, Vec<u8>>,
    pass: Pass,
    finished: HashMap<RenderTarget, Vec<Option<u32>>>,
    total_draws: u64,
    presents: u64,
}

impl HeadlessState {
    fn allocate_id(&mut self) -> GpuId {
        self.next_id += 1;
        self.next_id
    }

    fn bytes_in_use(&self) -> usize {
        self.buffers.values().sum::<usize>() + self.textures.values().sum::<usize>()
    }

    fn finish_pass(&mut self) {
        let pass = std::mem::take(&mut self.pass);
        let Some(target) = pass.target else {
            return;
        };
        if let RenderTarget::Offscreen(id) = target {
            let image = rasterize(&pass);
            self.pixels.insert(id, image);
        }
        self.finished.insert(target, pass.objects);
    }
}

fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn rasterize(pass: &Pass) -> Vec<u8> {
    let (w, h) = pass.size;
    let clear = pass.clear_color.map(to_byte);
    let mut pixels = clear.repeat(w as usize * h as usize);
    for overlay in &pass.overlays {
        let color = overlay.color.map(to_byte);
        let [x, y, rw, rh] = overlay.rect;
        let x0 = x.max(0.0) as u32;
        let y0 = y.max(0.0) as u32;
        let x1 = ((x + rw).max(0.0) as u32).min(w);
        let y1 = ((y + rh).max(0.0) as u32).min(h);
        for py in y0..y1 {
            for px in x0..x1 {
                let offset = (py as usize * w as usize + px as usize) * 4;
                pixels[offset..offset + 4].copy_from_slice(&color);
            }
        }
    }
    pixels
}

/// Read-only view of a [`HeadlessBackend`]'s bookkeeping
///
/// Stays valid after the backend moves to the render thread.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessProbe {
    /// Live buffer count
    pub fn live_buffers(&self) -> usize {
        lock(&self.state).buffers.len()
    }

    /// Live texture count
    pub fn live_textures(&self) -> usize {
        lock(&self.state).textures.len()
    }

    /// Live vertex arrays across all contexts
    pub fn live_vertex_arrays(&self) -> usize {
        lock(&self.state).vertex_arrays.len()
    }

    /// Live contexts, including hidden ones
    pub fn live_contexts(&self) -> usize {
        lock(&self.state).contexts.len()
    }

    /// Contexts that own a window, oldest first
    pub fn window_contexts(&self) -> Vec<ContextId> {
        let state = lock(&self.state);
        let mut contexts: Vec<ContextId> = state
            .contexts
            .iter()
            .filter(|(_, desc)| !desc.hidden)
            .map(|(context, _)| *context)
            .collect();
        contexts.sort();
        contexts
    }

    /// Bytes held by buffers and textures
    pub fn bytes_in_use(&self) -> usize {
        lock(&self.state).bytes_in_use()
    }

    /// Draw calls issued over the backend's life
    pub fn total_draws(&self) -> u64 {
        lock(&self.state).total_draws
    }

    /// Number of presents over the backend's life
    pub fn presents(&self) -> u64 {
        lock(&self.state).presents
    }

    /// Object ids drawn by the last completed pass on a target
    pub fn last_pass_objects(&self, target: RenderTarget) -> Option<Vec<Option<u32>>> {
        lock(&self.state).finished.get(&target).cloned()
    }
}

/// Allocation-tracking backend with no GPU
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
    memory_budget: Option<usize>,
}

impl HeadlessBackend {
    /// Backend with unlimited memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses uploads beyond `bytes` in total
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Handle for inspecting allocations from any thread
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn reserve(&self, state: &HeadlessState, bytes: usize) -> RenderResult<()> {
        match self.memory_budget {
            Some(budget) if state.bytes_in_use() + bytes > budget => Err(RenderError::OutOfMemory(
                format!("{bytes} bytes requested, {} of {budget} in use", state.bytes_in_use()),
            )),
            _ => Ok(()),
        }
    }

    fn check_context(state: &HeadlessState, context: ContextId) -> RenderResult<()> {
        if state.contexts.contains_key(&context) {
            Ok(())
        } else {
            Err(RenderError::ContextUnavailable(format!("{context:?} does not exist")))
        }
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_context(&mut self, desc: &WindowDesc) -> RenderResult<ContextId> {
        let mut state = lock(&self.state);
        let context = ContextId(state.allocate_id());
        state.contexts.insert(context, desc.clone());
        Ok(context)
    }

    fn destroy_context(&mut self, context: ContextId) {
        let mut state = lock(&self.state);
        state.contexts.remove(&context);
        state.vertex_arrays.retain(|(ctx, _), _| *ctx != context);
        if state.current == Some(context) {
            state.current = None;
        }
    }

    fn make_current(&mut self, context: ContextId) -> RenderResult<()> {
        let mut state = lock(&self.state);
        Self::check_context(&state, context)?;
        state.current = Some(context);
        Ok(())
    }

    fn surface_size(&self, context: ContextId) -> RenderResult<(u32, u32)> {
        let state = lock(&self.state);
        state
            .contexts
            .get(&context)
            .map(|desc| (desc.width, desc.height))
            .ok_or_else(|| RenderError::ContextUnavailable(format!("{context:?} does not exist")))
    }

    fn present(&mut self, context: ContextId) -> RenderResult<()> {
        let mut state = lock(&self.state);
        Self::check_context(&state, context)?;
        state.finish_pass();
        state.presents += 1;
        Ok(())
    }

    fn create_buffer(&mut self, _usage: BufferUsage, data: &[u8]) -> RenderResult<GpuId> {
        let mut state = lock(&self.state);
        self.reserve(&state, data.len())?;
        let id = state.allocate_id();
        state.buffers.insert(id, data.len());
        Ok(id)
    }

    fn delete_buffer(&mut self, id: GpuId) {
        lock(&self.state).buffers.remove(&id);
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<GpuId> {
        if data.len() != desc.byte_size() {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{}x{} {:?} texture needs {} bytes, got {}",
                desc.width,
                desc.height,
                desc.format,
                desc.byte_size(),
                data.len()
            )));
        }
        let mut state = lock(&self.state);
        self.reserve(&state, data.len())?;
        let id = state.allocate_id();
        state.textures.insert(id, data.len());
        Ok(id)
    }

    fn delete_texture(&mut self, id: GpuId) {
        lock(&self.state).textures.remove(&id);
    }

    fn create_vertex_array(
        &mut self,
        context: ContextId,
        vertex_buffer: GpuId,
        index_buffer: GpuId,
    ) -> RenderResult<GpuId> {
        let mut state = lock(&self.state);
        Self::check_context(&state, context)?;
        for buffer in [vertex_buffer, index_buffer] {
            if !state.buffers.contains_key(&buffer) {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "vertex array references missing buffer {buffer}"
                )));
            }
        }
        let id = state.allocate_id();
        state
            .vertex_arrays
            .insert((context, id), (vertex_buffer, index_buffer));
        Ok(id)
    }

    fn delete_vertex_array(&mut self, context: ContextId, id: GpuId) {
        lock(&self.state).vertex_arrays.remove(&(context, id));
    }

    fn begin_pass(&mut self, target: RenderTarget, size: (u32, u32), clear_color: [f32; 4]) -> RenderResult<()> {
        let mut state = lock(&self.state);
        match target {
            RenderTarget::Window(context) => Self::check_context(&state, context)?,
            RenderTarget::Offscreen(id) if !state.targets.contains_key(&id) => {
                return Err(RenderError::RenderingFailed(format!("no offscreen target {id}")));
            }
            RenderTarget::Offscreen(_) => {}
        }
        state.pass = Pass {
            target: Some(target),
            size,
            clear_color,
            ..Pass::default()
        };
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> RenderResult<()> {
        let mut state = lock(&self.state);
        let Some(context) = state.current else {
            return Err(RenderError::ContextUnavailable(String::from("no current context")));
        };
        if !state.vertex_arrays.contains_key(&(context, call.vertex_array)) {
            return Err(RenderError::RenderingFailed(format!(
                "vertex array {} not valid in {context:?}",
                call.vertex_array
            )));
        }
        if let Some(texture) = call.texture {
            if !state.textures.contains_key(&texture) {
                return Err(RenderError::StaleHandle(texture));
            }
        }
        state.pass.objects.push(call.object_id);
        state.total_draws += 1;
        Ok(())
    }

    fn draw_skybox(&mut self, texture: GpuId, _view: &Mat4, _projection: &Mat4) -> RenderResult<()> {
        let mut state = lock(&self.state);
        if !state.textures.contains_key(&texture) {
            return Err(RenderError::StaleHandle(texture));
        }
        state.pass.skybox = Some(texture);
        state.total_draws += 1;
        Ok(())
    }

    fn draw_overlay(&mut self, overlay: &OverlayDraw) -> RenderResult<()> {
        let mut state = lock(&self.state);
        state.pass.overlays.push(overlay.clone());
        state.total_draws += 1;
        Ok(())
    }

    fn create_offscreen_target(&mut self, width: u32, height: u32) -> RenderResult<GpuId> {
        if width == 0 || height == 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "offscreen target {width}x{height} is empty"
            )));
        }
        let mut state = lock(&self.state);
        self.reserve(&state, width as usize * height as usize * 4)?;
        let id = state.allocate_id();
        state.targets.insert(id, (width, height));
        Ok(id)
    }

    fn delete_offscreen_target(&mut self, id: GpuId) {
        let mut state = lock(&self.state);
        state.targets.remove(&id);
        state.pixels.remove(&id);
        state.finished.remove(&RenderTarget::Offscreen(id));
    }

    fn read_pixels(&mut self, target: GpuId) -> RenderResult<Vec<u8>> {
        let mut state = lock(&self.state);
        if state.pass.target == Some(RenderTarget::Offscreen(target)) {
            state.finish_pass();
        }
        state
            .pixels
            .get(&target)
            .cloned()
            .ok_or_else(|| RenderError::RenderingFailed(format!("nothing rendered to target {target}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::compress::TextureFormat;
    use crate::assets::TexFlags;

    #[test]
    fn test_budget_produces_out_of_memory() {
        let mut backend = HeadlessBackend::new().with_memory_budget(100);
        assert!(backend.create_buffer(BufferUsage::Vertex, &[0; 60]).is_ok());
        assert!(matches!(
            backend.create_buffer(BufferUsage::Vertex, &[0; 60]),
            Err(RenderError::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_texture_size_must_match_format() {
        let mut backend = HeadlessBackend::new();
        let desc = TextureDesc {
            width: 4,
            height: 4,
            format: TextureFormat::Bc1,
            flags: TexFlags::empty(),
        };
        assert!(backend.create_texture(&desc, &[0; 8]).is_ok());
        assert!(backend.create_texture(&desc, &[0; 64]).is_err());
    }

    #[test]
    fn test_offscreen_readback_has_clear_color_and_overlays() {
        let mut backend = HeadlessBackend::new();
        let target = backend.create_offscreen_target(4, 4).unwrap();
        backend
            .begin_pass(RenderTarget::Offscreen(target), (4, 4), [1.0, 0.0, 0.0, 1.0])
            .unwrap();
        backend
            .draw_overlay(&OverlayDraw {
                rect: [2.0, 2.0, 2.0, 2.0],
                color: [0.0, 0.0, 1.0, 1.0],
                texture: None,
            })
            .unwrap();
        let pixels = backend.read_pixels(target).unwrap();
        assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
        let last = (3 * 4 + 3) * 4;
        assert_eq!(&pixels[last..last + 4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_destroying_context_drops_its_vertex_arrays() {
        let mut backend = HeadlessBackend::new();
        let probe = backend.probe();
        let ctx = backend.create_context(&WindowDesc::hidden()).unwrap();
        let vb = backend.create_buffer(BufferUsage::Vertex, &[0; 32]).unwrap();
        let ib = backend.create_buffer(BufferUsage::Index, &[0; 12]).unwrap();
        backend.create_vertex_array(ctx, vb, ib).unwrap();
        assert_eq!(probe.live_vertex_arrays(), 1);
        backend.destroy_context(ctx);
        assert_eq!(probe.live_vertex_arrays(), 0);
        assert_eq!(probe.live_buffers(), 2);
    }
}
