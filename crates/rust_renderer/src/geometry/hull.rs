//! Convex bounding hull for rough picking
//!
//! The hull is a discrete oriented polytope: the point set is clamped between
//! pairs of planes along 13 fixed axes (the 3 box axes, 6 edge diagonals and
//! 4 corner diagonals). It is always convex, always contains every input
//! point, and is much tighter than the AABB for rotated or rounded shapes.

use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{Plane, Ray};

const AXES: [[f32; 3]; 13] = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, -1.0],
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Convex hull as a set of inward-facing planes
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    planes: Vec<Plane>,
}

impl ConvexHull {
    /// Hull from explicit inward-facing planes
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Bounding hull of a point set; `None` when empty
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut planes = Vec::with_capacity(AXES.len() * 2);
        for axis in AXES {
            let axis = Vec3::from(axis).normalize();
            let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
            for p in points {
                let d = axis.dot(p);
                lo = lo.min(d);
                hi = hi.max(d);
            }
            // axis . p >= lo  and  -axis . p >= -hi
            planes.push(Plane::new(axis, -lo));
            planes.push(Plane::new(-axis, hi));
        }
        Some(Self { planes })
    }

    /// The bounding planes
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Whether the point lies inside or on the hull
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= -1e-5)
    }

    /// Hull in another space
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            planes: self.planes.iter().map(|p| p.transformed(matrix)).collect(),
        }
    }

    /// Cyrus-Beck clip of the ray against the hull
    ///
    /// Returns the entry distance (0 if the origin is inside).
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let mut t_enter = 0.0_f32;
        let mut t_exit = f32::INFINITY;

        for plane in &self.planes {
            let dist = plane.distance_to_point(&ray.origin);
            let denom = plane.normal.dot(&ray.direction);
            if denom.abs() < f32::EPSILON {
                if dist < 0.0 {
                    return None;
                }
                continue;
            }
            let t = -dist / denom;
            if denom > 0.0 {
                // Moving inward across this plane
                t_enter = t_enter.max(t);
            } else {
                t_exit = t_exit.min(t);
            }
            if t_enter > t_exit {
                return None;
            }
        }
        Some(t_enter)
    }
}
