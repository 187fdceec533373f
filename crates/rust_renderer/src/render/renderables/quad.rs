//! Textured quads

use super::{draw_proto, generated_mesh, pick_triangles, RenderItem, Renderable};
use crate::assets::{Material, Primitive, TextureKey};
use crate::geometry::{Aabb, Ray};
use crate::render::backend::{ContextId, GpuBackend};
use crate::render::frame::FrameContext;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::MeshProto;
use crate::render::RenderResult;

/// Rectangle in the object XY plane, centered on the origin, with a texture
///
/// The texture is looked up through the texture cache on every draw, so it
/// shows the loading texture until the decode lands.
pub struct TextureQuadRenderable {
    proto: MeshProto,
    transparent: bool,
}

impl TextureQuadRenderable {
    /// Upload a `size[0]` by `size[1]` quad
    pub fn build(
        texture: TextureKey,
        size: [f32; 2],
        tint: [f32; 4],
        backend: &mut dyn GpuBackend,
        mem: &mut GraphicsMemManager,
    ) -> RenderResult<Self> {
        let (hw, hh) = (size[0] * 0.5, size[1] * 0.5);
        let positions = vec![[-hw, -hh, 0.0], [hw, -hh, 0.0], [hw, hh, 0.0], [-hw, hh, 0.0]];
        let uvs = vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let material = Material {
            name: texture.uri().to_string(),
            diffuse: tint,
            texture: Some(texture),
        };
        let data = generated_mesh(
            "texture-quad",
            positions,
            uvs,
            vec![0, 1, 2, 0, 2, 3],
            Primitive::Triangles,
            material,
        )?;
        Ok(Self {
            proto: MeshProto::build(data, backend, mem)?,
            transparent: tint[3] < 1.0,
        })
    }
}

impl Renderable for TextureQuadRenderable {
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
