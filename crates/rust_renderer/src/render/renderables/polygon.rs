//! Filled convex polygons

use super::{color_material, draw_proto, generated_mesh, pick_triangles, RenderItem, Renderable};
use crate::assets::{AssetError, Primitive};
use crate::geometry::{Aabb, Ray};
use crate::render::backend::{ContextId, GpuBackend};
use crate::render::frame::FrameContext;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProto;
use crate::render::RenderResult;

/// Triangle-fanned polygon with its own buffers
pub struct PolygonRenderable {
    proto: MeshProto,
    transparent: bool,
}

impl PolygonRenderable {
    /// Fan-triangulate and upload `vertices`; needs at least three
    pub fn build(
        vertices: &[[f32; 3]],
        color: [f32; 4],
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        if vertices.len() < 3 {
            return Err(AssetError::LoadFailed(format!("polygon needs 3 vertices, got {}", vertices.len())).into());
        }
        let indices = (1..vertices.len() as u32 - 1).flat_map(|i| [0, i, i + 1]).collect();
        let data = generated_mesh(
            "polygon",
            vertices.to_vec(),
            Vec::new(),
            indices,
            Primitive::Triangles,
            color_material("polygon", color),
        )?;
        Ok(Self {
            proto: MeshProto::build(data, backend, mem)?,
            transparent: color[3] < 1.0,
        })
    }
}

impl Renderable for PolygonRenderable {
    fn render(&self, frame: &mut FrameContext<'_>, item: &RenderItem) -> RenderResult<()> {
        draw_proto(&self.proto, frame, item, false)
    }

    fn render_transparent(&self, frame: &mut FrameContext<'_>, item: &RenderItem) -> RenderResult<()> {
        draw_proto(&self.proto, frame, item, true)
    }

    fn has_opaque(&self) -> bool {
        !self.transparent
    }

    fn has_transparent(&self) -> bool {
        self.transparent
    }

    fn bounds(&self) -> &Aabb {
        self.proto.data().aabb()
    }

    fn collision_dist(&self, ray: &Ray, precise: bool, _cos_half_angle: f32) -> Option<f32> {
        pick_triangles(self.proto.data(), ray, precise)
    }

    fn is_valid(&self) -> bool {
        self.proto.is_valid()
    }

    fn release_context(&self, context: ContextId, backend: &mut dyn GpuBackend) {
        self.proto.release_context(context, backend);
    }

    fn release(&self, backend: &mut dyn GpuBackend, mem: &mut GraphicsMemManager) {
        self.proto.release(backend, mem);
    }
}
