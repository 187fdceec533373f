//! Ray and overlay picking over a renderable list
//!
//! Picking runs on the caller's thread against an immutable list snapshot.
//! Each candidate is first tested against its world-space bounds, widened by
//! the picking cone for segments and points; only survivors pay for the
//! object-space hull, triangle or cone test. With a camera, objects outside
//! their distance range for that camera are skipped as in drawing.

use crate::foundation::math::Mat4;
use crate::geometry::Ray;
use crate::render::camera::{dist_to_bounds, CameraInfo};
use crate::render::renderables::RenderableList;
use crate::render::visibility::ViewId;
use std::cmp::Ordering;

/// One picked object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    /// Distance along the world ray
    pub distance: f32,
    /// Picking id of the object
    pub picking_id: u32,
}

fn cone_tan(cos_half_angle: f32) -> f32 {
    let cos = cos_half_angle.clamp(f32::EPSILON, 1.0);
    (1.0 - cos * cos).sqrt() / cos
}

/// All pickable objects hit by a world-space ray, nearest first
///
/// `camera` is the view's camera, if known; it enables the distance range
/// filter. Ties are ordered by picking id so results are reproducible.
pub fn pick(
    list: &RenderableList,
    ray: &Ray,
    view: ViewId,
    camera: Option<&CameraInfo>,
    precise: bool,
    cos_half_angle: f32,
) -> Vec<PickHit> {
    let eye: Option<Mat4> = camera.map(CameraInfo::view_matrix);
    let tan = cone_tan(cos_half_angle);
    let mut hits: Vec<PickHit> = list
        .items
        .iter()
        .filter(|item| item.visibility.in_view(view))
        .filter(|item| {
            eye.as_ref()
                .map_or(true, |eye| item.visibility.in_range(dist_to_bounds(eye, &item.world_bounds)))
        })
        .filter_map(|item| {
            let picking_id = item.picking_id?;
            if precise && item.renderable.cone_picked() {
                item.world_bounds.intersect_cone(ray, tan)?;
            } else {
                item.world_bounds.intersect_ray(ray)?;
            }
            let local_ray = ray.transformed(&item.inverse);
            let local_t = item.renderable.collision_dist(&local_ray, precise, cos_half_angle)?;
            Some(PickHit {
                distance: ray.world_distance(&local_ray, local_t, &item.model),
                picking_id,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then(a.picking_id.cmp(&b.picking_id))
    });
    hits
}

/// Nearest hit, if any
pub fn pick_nearest(
    list: &RenderableList,
    ray: &Ray,
    view: ViewId,
    camera: Option<&CameraInfo>,
    precise: bool,
    cos_half_angle: f32,
) -> Option<PickHit> {
    pick(list, ray, view, camera, precise, cos_half_angle).into_iter().next()
}

/// Picking ids of the overlays under a pixel, topmost first
pub fn overlay_pick(list: &RenderableList, x: f32, y: f32, view: ViewId) -> Vec<u32> {
    list.overlays
        .iter()
        .rev()
        .filter(|overlay| overlay.visibility.in_view(view) && overlay.contains(x, y))
        .filter_map(|overlay| overlay.picking_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MeshData;
    use crate::foundation::math::{utils, Mat4, Vec3};
    use crate::render::mesh_proto::MeshProto;
    use crate::render::proxy::{OverlayProxy, RenderProxy};
    use crate::render::renderables::test_support::gpu;
    use crate::render::renderables::{LineRenderable, MeshRenderable, PointsRenderable, RenderItem, Renderable};
    use crate::render::visibility::VisibilityInfo;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn cube_list(placements: &[(u32, Mat4)]) -> RenderableList {
        let (mut backend, mut mem) = gpu();
        let proto = MeshProto::build(Arc::new(MeshData::placeholder_cube()), &mut backend, &mut mem).unwrap();
        let cube: Arc<dyn Renderable> = Arc::new(MeshRenderable::new(Arc::new(proto)));
        let items = placements
            .iter()
            .map(|&(id, model)| {
                let proxy = RenderProxy::mesh("cube").with_transform(model).with_picking_id(id);
                RenderItem::new(Arc::clone(&cube), &proxy)
            })
            .collect();
        RenderableList {
            items,
            ..RenderableList::default()
        }
    }

    // Off the face diagonals
    fn down_z() -> Ray {
        Ray::new(Vec3::new(0.1, 0.2, 10.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn test_hits_sorted_nearest_first() {
        let list = cube_list(&[
            (1, Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0))),
            (2, Mat4::identity()),
            (3, Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0))),
        ]);
        let hits = pick(&list, &down_z(), ViewId(0), None, true, 1.0);
        assert_eq!(hits.iter().map(|h| h.picking_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_relative_eq!(hits[0].distance, 9.5, epsilon = 1e-4);
        assert_relative_eq!(hits[1].distance, 14.5, epsilon = 1e-4);
    }

    #[test]
    fn test_scaled_object_reports_world_distance() {
        let model = Mat4::new_translation(&Vec3::new(0.0, 0.0, -2.0)) * Mat4::new_scaling(4.0);
        let list = cube_list(&[(7, model)]);
        // Scaled cube spans z in [-4, 0]
        let hit = pick_nearest(&list, &down_z(), ViewId(0), None, true, 1.0).unwrap();
        assert_relative_eq!(hit.distance, 10.0, epsilon = 1e-4);
        let rough = pick_nearest(&list, &down_z(), ViewId(0), None, false, 1.0).unwrap();
        assert_relative_eq!(rough.distance, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_ties_break_by_id_and_repeat() {
        let list = cube_list(&[(9, Mat4::identity()), (4, Mat4::identity())]);
        let first = pick(&list, &down_z(), ViewId(0), None, true, 1.0);
        assert_eq!(first.iter().map(|h| h.picking_id).collect::<Vec<_>>(), vec![4, 9]);
        assert_eq!(pick(&list, &down_z(), ViewId(0), None, true, 1.0), first);
    }

    #[test]
    fn test_miss_and_view_filter() {
        let mut list = cube_list(&[(1, Mat4::identity())]);
        let away = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(pick_nearest(&list, &away, ViewId(0), None, true, 1.0).is_none());

        list.items[0].visibility = VisibilityInfo::only_in([ViewId(2)]);
        assert!(pick(&list, &down_z(), ViewId(0), None, true, 1.0).is_empty());
        assert_eq!(pick(&list, &down_z(), ViewId(2), None, true, 1.0).len(), 1);
    }

    #[test]
    fn test_rotated_object() {
        let model = Mat4::new_rotation(Vec3::new(0.0, utils::deg_to_rad(45.0), 0.0));
        let list = cube_list(&[(1, model)]);
        // Front edge sits at half the diagonal; the faces beside it slope at 45 degrees
        let ray = Ray::new(Vec3::new(0.1, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = pick_nearest(&list, &ray, ViewId(0), None, true, 1.0).unwrap();
        assert_relative_eq!(hit.distance, 10.0 - (0.5 * 2.0_f32.sqrt() - 0.1), epsilon = 1e-3);
    }

    #[test]
    fn test_cone_reaches_segment_and_point_beside_ray() {
        let (mut backend, mut mem) = gpu();
        let segment: Arc<dyn Renderable> =
            Arc::new(LineRenderable::build(&[[[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]]], [1.0; 4], &mut backend, &mut mem).unwrap());
        let point: Arc<dyn Renderable> =
            Arc::new(PointsRenderable::build(&[[0.0, 0.0, 0.0]], [1.0; 4], &mut backend, &mut mem).unwrap());
        let list = RenderableList {
            items: vec![
                RenderItem::new(segment, &RenderProxy::mesh("segment").with_picking_id(1)),
                RenderItem::new(point, &RenderProxy::mesh("point").with_picking_id(2)),
            ],
            ..RenderableList::default()
        };
        let ray = Ray::new(Vec3::new(0.0, 0.05, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let cos = utils::deg_to_rad(1.0).cos();

        let hits = pick(&list, &ray, ViewId(0), None, true, cos);
        assert_eq!(hits.iter().map(|h| h.picking_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_relative_eq!(hits[0].distance, 10.0, epsilon = 1e-3);
        assert!(pick(&list, &ray, ViewId(0), None, true, utils::deg_to_rad(0.1).cos()).is_empty());
    }

    #[test]
    fn test_distance_range_follows_camera() {
        let mut list = cube_list(&[(1, Mat4::identity())]);
        list.items[0].visibility = VisibilityInfo::everywhere().with_distance_range(0.0, 20.0);
        let near = CameraInfo::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        let far = CameraInfo::looking_at(Vec3::new(0.0, 0.0, 50.0), Vec3::zeros(), Vec3::y());

        assert_eq!(pick(&list, &down_z(), ViewId(0), Some(&near), true, 1.0).len(), 1);
        assert!(pick(&list, &down_z(), ViewId(0), Some(&far), true, 1.0).is_empty());
        // Without a camera the range is not applied
        assert_eq!(pick(&list, &down_z(), ViewId(0), None, true, 1.0).len(), 1);
    }

    #[test]
    fn test_overlay_pick_is_topmost_first() {
        let mut list = RenderableList::default();
        list.overlays.push(OverlayProxy::colored([0.0, 0.0, 100.0, 100.0], [1.0; 4]).with_picking_id(1));
        list.overlays.push(OverlayProxy::colored([50.0, 50.0, 100.0, 100.0], [1.0; 4]).with_picking_id(2));
        list.overlays.push(OverlayProxy::colored([60.0, 60.0, 10.0, 10.0], [1.0; 4]));
        assert_eq!(overlay_pick(&list, 75.0, 75.0, ViewId(0)), vec![2, 1]);
        assert_eq!(overlay_pick(&list, 10.0, 10.0, ViewId(0)), vec![1]);
        assert!(overlay_pick(&list, 500.0, 10.0, ViewId(0)).is_empty());
    }
}
