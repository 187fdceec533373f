//! Geometric primitives for culling and picking

pub mod bounds;
pub mod hull;
pub mod ray;

pub use bounds::{Aabb, BoundingSphere, Plane};
pub use hull::ConvexHull;
pub use ray::{Ray, Triangle};
