//! Debug point clouds

use super::{color_material, draw_proto, generated_mesh, RenderItem, Renderable};
use crate::assets::Primitive;
use crate::foundation::math::Vec3;
use crate::geometry::{Aabb, Ray};
use crate::render::backend::{ContextId, GpuBackend};
use crate::render::frame::FrameContext;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProto;
use crate::render::RenderResult;

/// Points with their own buffers
pub struct PointsRenderable {
    proto: MeshProto,
    transparent: bool,
}

impl PointsRenderable {
    /// Upload `points`; fails on an empty list
    pub fn build(
        points: &[[f32; 3]],
        color: [f32; 4],
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let indices = (0..points.len() as u32).collect();
        let data = generated_mesh(
            "debug-points",
            points.to_vec(),
            Vec::new(),
            indices,
            Primitive::Points,
            color_material("debug-points", color),
        )?;
        Ok(Self {
            proto: MeshProto::build(data, backend, mem)?,
            transparent: color[3] < 1.0,
        })
    }
}

impl Renderable for PointsRenderable {
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

    fn collision_dist(&self, ray: &Ray, precise: bool, cos_half_angle: f32) -> Option<f32> {
        let data = self.proto.data();
        if !precise {
            return data.hull().intersect_ray(ray);
        }
        data.positions()
            .iter()
            .filter_map(|p| ray.cone_hit_point(&Vec3::from(*p), cos_half_angle))
            .min_by(f32::total_cmp)
    }

    fn cone_picked(&self) -> bool {
        true
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
