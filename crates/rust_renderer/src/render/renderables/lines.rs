//! Debug line segments

use super::{color_material, draw_proto, generated_mesh, RenderItem, Renderable};
use crate::assets::Primitive;
use crate::foundation::math::Vec3;
use crate::geometry::{Aabb, Ray};
use crate::render::backend::{ContextId, GpuBackend};
use crate::render::frame::FrameContext;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProto;
use crate::render::RenderResult;

/// Line segments with their own buffers
pub struct LineRenderable {
    proto: MeshProto,
    transparent: bool,
}

impl LineRenderable {
    /// Upload `segments`; fails on an empty list
    pub fn build(
        segments: &[[[f32; 3]; 2]],
        color: [f32; 4],
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let positions: Vec<[f32; 3]> = segments.iter().flatten().copied().collect();
        let indices = (0..positions.len() as u32).collect();
        let data = generated_mesh(
            "debug-lines",
            positions,
            Vec::new(),
            indices,
            Primitive::Lines,
            color_material("debug-lines", color),
        )?;
        Ok(Self {
            proto: MeshProto::build(data, backend, mem)?,
            transparent: color[3] < 1.0,
        })
    }
}

impl Renderable for LineRenderable {
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
            .chunks_exact(2)
            .filter_map(|segment| {
                ray.cone_hit_segment(&Vec3::from(segment[0]), &Vec3::from(segment[1]), cos_half_angle)
            })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::utils;
    use crate::render::renderables::test_support::gpu;
    use approx::assert_relative_eq;

    #[test]
    fn test_precise_pick_uses_cone() {
        let (mut backend, mut mem) = gpu();
        let lines = LineRenderable::build(
            &[[[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]],
            [1.0, 1.0, 0.0, 1.0],
            &mut backend,
            &mut mem,
        )
        .unwrap();
        let cos = utils::deg_to_rad(1.0).cos();

        // Passes 0.05 above the segment at distance 10: about 0.29 degrees off
        let near_miss = Ray::new(Vec3::new(0.0, 0.05, 10.0), Vec3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(lines.collision_dist(&near_miss, true, cos).unwrap(), 10.0, epsilon = 1e-4);

        let far_miss = Ray::new(Vec3::new(0.0, 1.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(lines.collision_dist(&far_miss, true, cos).is_none());
    }

    #[test]
    fn test_empty_segments_fail() {
        let (mut backend, mut mem) = gpu();
        assert!(LineRenderable::build(&[], [1.0; 4], &mut backend, &mut mem).is_err());
    }

    #[test]
    fn test_release_frees_buffers() {
        let (mut backend, mut mem) = gpu();
        let probe = backend.probe();
        let lines = LineRenderable::build(&[[[0.0; 3], [0.0, 1.0, 0.0]]], [1.0; 4], &mut backend, &mut mem).unwrap();
        assert_eq!(probe.live_buffers(), 2);
        lines.release(&mut backend, &mut mem);
        assert_eq!(probe.live_buffers(), 0);
        assert!(!lines.is_valid());
    }
}
