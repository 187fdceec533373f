//! Mesh assets

use super::{draw_proto, pick_triangles, RenderItem, Renderable};
use crate::geometry::{Aabb, Ray};
use crate::render::frame::FrameContext;
use crate::render::mesh_proto::MeshProto;
use crate::render::RenderResult;
use std::sync::Arc;

/// Renderable over a shared mesh prototype
///
/// The prototype belongs to the [`MeshProtoCache`], so releasing the
/// renderable leaves its buffers alone.
///
/// [`MeshProtoCache`]: crate::render::MeshProtoCache
pub struct MeshRenderable {
    proto: Arc<MeshProto>,
    has_opaque: bool,
    has_transparent: bool,
}

impl MeshRenderable {
    /// Wrap a prototype
    pub fn new(proto: Arc<MeshProto>) -> Self {
        let sub_meshes = proto.data().sub_meshes();
        let has_transparent = sub_meshes.iter().any(|s| s.material.is_transparent());
        let has_opaque = sub_meshes.iter().any(|s| !s.material.is_transparent());
        Self {
            proto,
            has_opaque,
            has_transparent,
        }
    }

    /// The wrapped prototype
    pub fn proto(&self) -> &Arc<MeshProto> {
        &self.proto
    }
}

impl Renderable for MeshRenderable {
    fn render(&self, frame: &mut FrameContext<'_>, item: &RenderItem) -> RenderResult<()> {
        draw_proto(&self.proto, frame, item, false)
    }

    fn render_transparent(&self, frame: &mut FrameContext<'_>, item: &RenderItem) -> RenderResult<()> {
        draw_proto(&self.proto, frame, item, true)
    }

    fn has_opaque(&self) -> bool {
        self.has_opaque
    }

    fn has_transparent(&self) -> bool {
        self.has_transparent
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MeshData;
    use crate::foundation::math::Vec3;
    use crate::render::renderables::test_support::gpu;
    use approx::assert_relative_eq;

    #[test]
    fn test_rough_and_precise_cube_picks() {
        let (mut backend, mut mem) = gpu();
        let proto = MeshProto::build(Arc::new(MeshData::placeholder_cube()), &mut backend, &mut mem).unwrap();
        let mesh = MeshRenderable::new(Arc::new(proto));
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));

        assert_relative_eq!(mesh.collision_dist(&ray, false, 1.0).unwrap(), 4.5, epsilon = 1e-4);
        assert_relative_eq!(mesh.collision_dist(&ray, true, 1.0).unwrap(), 4.5, epsilon = 1e-4);

        let miss = Ray::new(Vec3::new(3.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(mesh.collision_dist(&miss, true, 1.0).is_none());
        assert!(mesh.has_opaque());
        assert!(!mesh.has_transparent());
    }
}
