//! GPU-side renderables
//!
//! A [`Renderable`] is the render-thread object a [`RenderProxy`] resolves
//! to. It owns (or shares) GPU geometry and knows how to draw and pick
//! itself in object space. Placement comes from the [`RenderItem`] that
//! pairs it with a proxy's transform, visibility and picking id.
//!
//! [`RenderProxy`]: crate::render::RenderProxy

mod cache;
mod lines;
mod mesh;
mod points;
mod polygon;
mod quad;

pub use cache::{RenderableCache, RenderableSlot};
pub use lines::LineRenderable;
pub use mesh::MeshRenderable;
pub use points::PointsRenderable;
pub use polygon::PolygonRenderable;
pub use quad::TextureQuadRenderable;

use crate::assets::{Material, MeshData, Primitive, SubMesh};
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::geometry::{Aabb, Ray};
use crate::render::backend::{ContextId, DrawCall, GpuBackend};
use crate::render::frame::FrameContext;
use crate::render::gpu_memory::GraphicsMemManager;
use crate::render::mesh_proto::{MeshProto, MeshProtoCache};
use crate::render::proxy::{OverlayProxy, ProxyKind, RenderProxy, RenderableKey};
use crate::render::visibility::VisibilityInfo;
use crate::render::RenderResult;
use std::sync::Arc;

/// Drawable, pickable GPU-side object
pub trait Renderable: Send + Sync {
    /// Draw the opaque parts
    fn render(&self, frame: &mut FrameContext<'_>, item: &RenderItem) -> RenderResult<()>;

    /// Draw the transparent parts
    fn render_transparent(&self, _frame: &mut FrameContext<'_>, _item: &RenderItem) -> RenderResult<()> {
        Ok(())
    }

    /// Whether there is anything for the opaque pass
    fn has_opaque(&self) -> bool {
        true
    }

    /// Whether there is anything for the transparent pass
    fn has_transparent(&self) -> bool {
        false
    }

    /// Object-space bounds
    fn bounds(&self) -> &Aabb;

    /// Distance along an object-space ray to the closest hit
    ///
    /// Rough queries test the convex hull only; precise ones test the actual
    /// triangles, segments or points, the latter two within a cone of the
    /// given half-angle cosine around the ray.
    fn collision_dist(&self, ray: &Ray, precise: bool, cos_half_angle: f32) -> Option<f32>;

    /// Whether precise picking tests a cone around the ray
    fn cone_picked(&self) -> bool {
        false
    }

    /// Whether the GPU objects are still resident
    fn is_valid(&self) -> bool;

    /// Drop per-context objects of a context that is going away
    fn release_context(&self, _context: ContextId, _backend: &mut dyn GpuBackend) {}

    /// Free owned GPU objects
    fn release(&self, _backend: &mut dyn GpuBackend, _mem: &mut GraphicsMemManager) {}
}

/// A renderable placed in the scene
#[derive(Clone)]
pub struct RenderItem {
    /// Shared GPU-side object
    pub renderable: Arc<dyn Renderable>,
    /// Cache key it was resolved through
    pub key: RenderableKey,
    /// Object to world
    pub model: Mat4,
    /// World to object
    pub inverse: Mat4,
    /// World-space bounds
    pub world_bounds: Aabb,
    /// View and distance eligibility
    pub visibility: VisibilityInfo,
    /// Picking id, if pickable
    pub picking_id: Option<u32>,
}

impl RenderItem {
    /// Place `renderable` according to `proxy`
    pub fn new(renderable: Arc<dyn Renderable>, proxy: &RenderProxy) -> Self {
        let model = *proxy.transform();
        Self {
            key: proxy.key(),
            model,
            inverse: model.inverse_or_identity(),
            world_bounds: renderable.bounds().transformed(&model),
            visibility: proxy.visibility().clone(),
            picking_id: proxy.picking_id(),
            renderable,
        }
    }
}

/// Renderables of one scene snapshot, in submission order
#[derive(Clone, Default)]
pub struct RenderableList {
    /// 3D content
    pub items: Vec<RenderItem>,
    /// Screen-space content, back to front
    pub overlays: Vec<OverlayProxy>,
    /// Scene generation this list was built from
    pub generation: u64,
}

impl RenderableList {
    /// Whether any renderable lost its GPU objects
    pub fn needs_rebuild(&self) -> bool {
        self.items.iter().any(|item| !item.renderable.is_valid())
    }
}

/// Create the renderable for a proxy kind
pub fn build_renderable(
    kind: &ProxyKind,
    protos: &mut MeshProtoCache,
    backend: &mut dyn GpuBackend,
    mem: &mut GraphicsMemManager,
) -> RenderResult<Arc<dyn Renderable>> {
    Ok(match kind {
        ProxyKind::Mesh(key) => Arc::new(MeshRenderable::new(protos.get_proto(key, backend, mem))),
        ProxyKind::DebugLines { segments, color } => {
            Arc::new(LineRenderable::build(segments, *color, backend, mem)?)
        }
        ProxyKind::DebugPoints { points, color } => {
            Arc::new(PointsRenderable::build(points, *color, backend, mem)?)
        }
        ProxyKind::Polygon { vertices, color } => {
            Arc::new(PolygonRenderable::build(vertices, *color, backend, mem)?)
        }
        ProxyKind::TextureQuad { texture, size, color } => Arc::new(TextureQuadRenderable::build(
            texture.clone(),
            *size,
            *color,
            backend,
            mem,
        )?),
    })
}

/// Single-sub-mesh data for generated geometry
fn generated_mesh(
    name: &str,
    positions: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
    primitive: Primitive,
    material: Material,
) -> RenderResult<Arc<MeshData>> {
    let sub_mesh = SubMesh {
        indices,
        primitive,
        material,
    };
    Ok(Arc::new(MeshData::new(name, positions, Vec::new(), uvs, vec![sub_mesh])?))
}

/// Flat-colored material
fn color_material(name: &str, color: [f32; 4]) -> Material {
    Material {
        name: name.to_string(),
        diffuse: color,
        texture: None,
    }
}

/// Issue one draw per sub-mesh of the requested pass
fn draw_proto(
    proto: &MeshProto,
    frame: &mut FrameContext<'_>,
    item: &RenderItem,
    transparent: bool,
) -> RenderResult<()> {
    let vertex_array = proto.vertex_array(frame.context, frame.backend, frame.mem)?;
    for (range, sub_mesh) in proto.ranges().iter().zip(proto.data().sub_meshes()) {
        if range.count == 0 || sub_mesh.material.is_transparent() != transparent {
            continue;
        }
        let texture = match &sub_mesh.material.texture {
            Some(key) => Some(frame.textures.resolve(key).bind(frame.mem)?),
            None => None,
        };
        frame.backend.draw(&DrawCall {
            vertex_array,
            primitive: range.primitive,
            first_index: range.first,
            index_count: range.count,
            model: item.model,
            view: frame.view,
            projection: frame.projection,
            color: sub_mesh.material.diffuse,
            texture,
            blend: transparent,
            log_depth: frame.log_depth,
            object_id: item.picking_id,
        })?;
        frame.draw_calls += 1;
    }
    Ok(())
}

/// Closest triangle hit, or the hull entry for rough queries
fn pick_triangles(data: &MeshData, ray: &Ray, precise: bool) -> Option<f32> {
    if !precise {
        return data.hull().intersect_ray(ray);
    }
    data.triangles()
        .filter_map(|tri| tri.intersect_ray(ray).map(|(t, _, _)| t))
        .min_by(f32::total_cmp)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::foundation::time::ManualClock;
    use crate::render::backends::HeadlessBackend;

    pub fn gpu() -> (HeadlessBackend, GraphicsMemManager) {
        (
            HeadlessBackend::new(),
            GraphicsMemManager::new(Arc::new(ManualClock::new()), MemoryConfig::default()),
        )
    }
}
