//! Camera, frustum culling and screen rays
//!
//! [`CameraInfo`] is the plain value applications send to the renderer.
//! [`Camera`] lives on the render thread and lazily derives the projection,
//! the logarithmic-depth constants and a five-plane world-space frustum
//! (top, bottom, left, right, far). There is no near plane: logarithmic depth
//! keeps precision down to the eye.

use crate::assets::TextureKey;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};
use crate::geometry::{Aabb, BoundingSphere, Plane, Ray};
use crate::render::backend::LogDepth;

/// Camera parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
    /// Camera to world
    pub transform: Mat4,
    /// Optional skybox texture drawn behind the scene
    pub skybox: Option<TextureKey>,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            fov_y: utils::deg_to_rad(60.0),
            near: 0.1,
            far: 10_000.0,
            transform: Mat4::identity(),
            skybox: None,
        }
    }
}

impl CameraInfo {
    /// Camera at `eye` looking at `target`
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            transform: Mat4::look_at(eye, target, up).inverse_or_identity(),
            ..Self::default()
        }
    }

    /// World to view
    pub fn view_matrix(&self) -> Mat4 {
        self.transform.inverse_or_identity()
    }
}

/// Distance in front of a view to the box center (negated view Z)
pub fn dist_to_bounds(view: &Mat4, aabb: &Aabb) -> f32 {
    -utils::transform_point(view, &aabb.center()).z
}

const LOG_DEPTH_C: f32 = 1.0;

#[derive(Debug, Clone)]
struct Derived {
    view: Mat4,
    projection: Mat4,
    log_depth: LogDepth,
    planes: [Plane; 5],
    tan_half_x: f32,
    tan_half_y: f32,
}

/// Render-thread camera with cached matrices and frustum
#[derive(Debug, Clone)]
pub struct Camera {
    info: CameraInfo,
    viewport: (u32, u32),
    derived: Option<Derived>,
}

impl Camera {
    /// Camera for a viewport in pixels
    pub fn new(info: CameraInfo, viewport: (u32, u32)) -> Self {
        Self {
            info,
            viewport,
            derived: None,
        }
    }

    /// Current parameters
    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Replace the parameters
    pub fn set_info(&mut self, info: CameraInfo) {
        self.info = info;
        self.derived = None;
    }

    /// Move the camera
    pub fn set_transform(&mut self, transform: Mat4) {
        self.info.transform = transform;
        self.derived = None;
    }

    /// Resize the viewport; a no-op if unchanged
    pub fn set_viewport(&mut self, viewport: (u32, u32)) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.derived = None;
        }
    }

    /// Viewport in pixels
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.info.transform.column(3).xyz()
    }

    /// World to view
    pub fn view(&mut self) -> Mat4 {
        self.derived().view
    }

    /// View to clip
    pub fn projection(&mut self) -> Mat4 {
        self.derived().projection
    }

    /// Logarithmic depth constants `C` and `FC`
    pub fn log_depth(&mut self) -> LogDepth {
        self.derived().log_depth
    }

    /// World-space frustum planes: top, bottom, left, right, far
    pub fn planes(&mut self) -> [Plane; 5] {
        self.derived().planes
    }

    fn derived(&mut self) -> &Derived {
        let (info, viewport) = (&self.info, self.viewport);
        self.derived.get_or_insert_with(|| compute(info, viewport))
    }

    /// Whether a world-space sphere may be visible
    pub fn collides_sphere(&mut self, sphere: &BoundingSphere) -> bool {
        self.derived()
            .planes
            .iter()
            .all(|plane| plane.distance_to_point(&sphere.center) >= -sphere.radius)
    }

    /// Whether a world-space box may be visible
    ///
    /// Conservative: a box is rejected only when it lies entirely behind one
    /// plane.
    pub fn collides_aabb(&mut self, aabb: &Aabb) -> bool {
        self.derived().planes.iter().all(|plane| {
            // Corner furthest along the plane normal
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.distance_to_point(&positive) >= 0.0
        })
    }

    /// Distance in front of the camera to the box center (negated view Z)
    pub fn dist_to_bounds(&mut self, aabb: &Aabb) -> f32 {
        dist_to_bounds(&self.derived().view, aabb)
    }

    /// Projected diameter of a sphere in pixels
    ///
    /// Infinite for spheres around or behind the eye.
    pub fn pixel_size(&mut self, sphere: &BoundingSphere) -> f32 {
        let height = self.viewport.1 as f32;
        let derived = self.derived();
        let depth = -utils::transform_point(&derived.view, &sphere.center).z;
        if depth <= sphere.radius {
            return f32::INFINITY;
        }
        sphere.radius * 2.0 / (depth * 2.0 * derived.tan_half_y) * height
    }

    /// World ray through pixel `(x, y)`, origin top-left
    pub fn screen_ray(&mut self, x: f32, y: f32) -> Ray {
        let (w, h) = self.viewport;
        let ndc_x = 2.0 * x / w.max(1) as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * y / h.max(1) as f32;
        let (tan_half_x, tan_half_y) = {
            let derived = self.derived();
            (derived.tan_half_x, derived.tan_half_y)
        };
        let dir_view = Vec4::new(ndc_x * tan_half_x, ndc_y * tan_half_y, -1.0, 0.0);
        let dir_world = (self.info.transform * dir_view).xyz();
        Ray::new(self.position(), dir_world)
    }
}

fn compute(info: &CameraInfo, viewport: (u32, u32)) -> Derived {
    let aspect = if viewport.1 == 0 {
        1.0
    } else {
        viewport.0 as f32 / viewport.1 as f32
    };
    let tan_half_y = (info.fov_y * 0.5).tan();
    let tan_half_x = tan_half_y * aspect;

    let view_space = [
        // top
        Plane::new(Vec3::new(0.0, -1.0, -tan_half_y), 0.0),
        // bottom
        Plane::new(Vec3::new(0.0, 1.0, -tan_half_y), 0.0),
        // left
        Plane::new(Vec3::new(1.0, 0.0, -tan_half_x), 0.0),
        // right
        Plane::new(Vec3::new(-1.0, 0.0, -tan_half_x), 0.0),
        // far
        Plane::new(Vec3::new(0.0, 0.0, 1.0), info.far),
    ];

    Derived {
        view: info.view_matrix(),
        projection: Mat4::perspective_gl(info.fov_y, aspect, info.near, info.far),
        log_depth: LogDepth {
            c: LOG_DEPTH_C,
            fc: 2.0 / (LOG_DEPTH_C * info.far + 1.0).log2(),
        },
        planes: view_space.map(|p| p.transformed(&info.transform)),
        tan_half_x,
        tan_half_y,
    }
}
