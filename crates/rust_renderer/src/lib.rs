//! # Rust Renderer
//!
//! A render scheduler that draws a dynamic scene on a dedicated render
//! thread while streaming meshes and textures from disk and keeping GPU
//! memory bounded.
//!
//! ## Features
//!
//! - **Single render thread**: every GPU call happens on one thread; other
//!   threads publish scenes and post messages
//! - **Streaming asset caches**: mesh data parsed at most once per key,
//!   textures decoded in the background and uploaded once per frame
//! - **GPU memory reclamation**: idle buffers and textures are evicted once
//!   they exceed both a time and a frame threshold
//! - **Culling and picking**: five-plane frustum culling, apparent-size
//!   culling, rough (hull) and precise (triangle / cone) ray picking
//! - **Pluggable backend**: a [`render::GpuBackend`] trait with an in-memory
//!   [`render::HeadlessBackend`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_renderer::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     rust_renderer::foundation::logging::init();
//!
//!     let renderer = Renderer::start(RendererConfig::default(), || {
//!         Ok(Box::new(HeadlessBackend::new()) as Box<dyn GpuBackend>)
//!     })?;
//!     renderer.wait_until_ready()?;
//!
//!     let window = renderer.create_window(WindowDesc::new("viewer", 800, 600))?;
//!     renderer.set_camera_info(
//!         window,
//!         CameraInfo::looking_at(Vec3::new(0.0, 2.0, 10.0), Vec3::zeros(), Vec3::y()),
//!     )?;
//!
//!     let mut scene = ProxyScene::new();
//!     scene.push(RenderProxy::mesh("models/ship.obj").with_picking_id(1));
//!     renderer.set_scene(scene);
//!     renderer.sync().block_until_done()?;
//!
//!     let ray = Ray::new(Vec3::new(0.0, 2.0, 10.0), Vec3::new(0.0, -0.2, -1.0));
//!     for hit in renderer.pick(&ray, window, true) {
//!         println!("picked {} at {}", hit.picking_id, hit.distance);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod geometry;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, DecodedImage, MeshData, MeshProtoKey, TexFlags, TextureKey},
        config::{Config, RendererConfig},
        foundation::math::{Mat4, Vec3},
        geometry::{Aabb, Ray},
        render::{
            CameraInfo, FrameStats, FreeRequest, GpuBackend, HeadlessBackend, OverlayProxy, PickHit,
            ProxyKind, ProxyScene, RenderError, RenderFuture, RenderProxy, RenderResult, Renderer,
            ViewId, VisibilityInfo, WindowDesc, WindowId,
        },
    };
}
