//! Rays, triangles and the picking cone

use crate::foundation::math::{utils, Mat4, Vec3};

/// A ray for ray casting and picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction of the ray (normalized on construction)
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray expressed in another space
    ///
    /// The direction is renormalized, so distances along the result are not
    /// distances along `self` once the matrix scales. Map hits back through
    /// [`Ray::world_distance`].
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::new(
            utils::transform_point(matrix, &self.origin),
            utils::transform_vector(matrix, &self.direction),
        )
    }

    /// Distance along this (world) ray to a hit found on a local-space ray
    ///
    /// `local_ray` must be this ray transformed by the inverse of `model`.
    pub fn world_distance(&self, local_ray: &Self, local_t: f32, model: &Mat4) -> f32 {
        let world_point = utils::transform_point(model, &local_ray.point_at(local_t));
        (world_point - self.origin).dot(&self.direction)
    }

    /// Whether `point` lies within the cone of the given half-angle around
    /// the ray; returns the distance along the ray if so
    pub fn cone_hit_point(&self, point: &Vec3, cos_half_angle: f32) -> Option<f32> {
        let to_point = point - self.origin;
        let along = to_point.dot(&self.direction);
        if along <= 0.0 {
            return None;
        }
        let length = to_point.magnitude();
        if length <= f32::EPSILON || along / length >= cos_half_angle {
            Some(along)
        } else {
            None
        }
    }

    /// Cone test against a segment
    ///
    /// Uses the point on the segment closest to the ray, then the same
    /// angular criterion as [`Ray::cone_hit_point`].
    pub fn cone_hit_segment(&self, a: &Vec3, b: &Vec3, cos_half_angle: f32) -> Option<f32> {
        let closest = self.closest_point_on_segment(a, b);
        self.cone_hit_point(&closest, cos_half_angle)
    }

    fn closest_point_on_segment(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        let segment = b - a;
        let seg_len_sq = segment.magnitude_squared();
        if seg_len_sq <= f32::EPSILON {
            return *a;
        }
        let w = a - self.origin;
        let d_dot_s = self.direction.dot(&segment);
        let denom = seg_len_sq - d_dot_s * d_dot_s;
        let s = if denom.abs() <= f32::EPSILON {
            // Parallel: project the segment start
            0.0
        } else {
            (d_dot_s * self.direction.dot(&w) - segment.dot(&w)) / denom
        };
        a + segment * s.clamp(0.0, 1.0)
    }
}

/// A triangle for picking
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    /// First vertex
    pub v0: Vec3,
    /// Second vertex
    pub v1: Vec3,
    /// Third vertex
    pub v2: Vec3,
}

impl Triangle {
    /// Creates a new triangle
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Two or more coincident vertices
    pub fn is_degenerate(&self) -> bool {
        self.v0 == self.v1 || self.v1 == self.v2 || self.v0 == self.v2
    }

    /// Möller-Trumbore ray-triangle intersection
    ///
    /// Returns `(t, u, v)` if hit, None otherwise. Degenerate triangles never
    /// hit.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        const EPSILON: f32 = 0.000_001;

        if self.is_degenerate() {
            return None;
        }

        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(&edge2);
        let a = edge1.dot(&h);

        // Ray parallel to triangle?
        if a.abs() < EPSILON {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(&h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(&edge1);
        let v = f * ray.direction.dot(&q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(&q);
        if t >= 0.0 {
            Some((t, u, v))
        } else {
            None
        }
    }
}
