//! Render-backend-agnostic scene description
//!
//! Application threads build a [`ProxyScene`] of immutable [`RenderProxy`]
//! values and hand it to the renderer. Each proxy carries a
//! [`RenderableKey`] derived from its draw content (not its transform), which
//! the render thread uses to find the cached GPU-side renderable.

use crate::assets::{MeshProtoKey, TextureKey};
use crate::foundation::math::{utils, Mat4};
use crate::render::visibility::VisibilityInfo;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Cache key of the renderable a proxy resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableKey(pub u64);

/// What a proxy draws
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyKind {
    /// A mesh asset
    Mesh(MeshProtoKey),
    /// Debug line segments in object space
    DebugLines {
        /// Segment end points
        segments: Vec<[[f32; 3]; 2]>,
        /// RGBA color
        color: [f32; 4],
    },
    /// Debug points in object space
    DebugPoints {
        /// Point positions
        points: Vec<[f32; 3]>,
        /// RGBA color
        color: [f32; 4],
    },
    /// A planar convex polygon, vertices in winding order
    Polygon {
        /// Outline
        vertices: Vec<[f32; 3]>,
        /// RGBA color
        color: [f32; 4],
    },
    /// A textured rectangle in the object XY plane, centered on the origin
    TextureQuad {
        /// Texture
        texture: TextureKey,
        /// Width and height
        size: [f32; 2],
        /// RGBA tint
        color: [f32; 4],
    },
}

fn hash_floats<H: Hasher>(values: &[f32], state: &mut H) {
    values.len().hash(state);
    for bits in utils::float_bits(values) {
        bits.hash(state);
    }
}

impl Hash for ProxyKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Mesh(key) => key.hash(state),
            Self::DebugLines { segments, color } => {
                let flat: Vec<f32> = segments.iter().flatten().flatten().copied().collect();
                hash_floats(&flat, state);
                hash_floats(color, state);
            }
            Self::DebugPoints { points, color } => {
                let flat: Vec<f32> = points.iter().flatten().copied().collect();
                hash_floats(&flat, state);
                hash_floats(color, state);
            }
            Self::Polygon { vertices, color } => {
                let flat: Vec<f32> = vertices.iter().flatten().copied().collect();
                hash_floats(&flat, state);
                hash_floats(color, state);
            }
            Self::TextureQuad { texture, size, color } => {
                texture.hash(state);
                hash_floats(size, state);
                hash_floats(color, state);
            }
        }
    }
}

impl ProxyKind {
    /// Content-derived cache key
    pub fn renderable_key(&self) -> RenderableKey {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        RenderableKey(hasher.finish())
    }
}

/// Immutable draw description
#[derive(Debug, Clone)]
pub struct RenderProxy {
    kind: Arc<ProxyKind>,
    key: RenderableKey,
    transform: Mat4,
    visibility: VisibilityInfo,
    picking_id: Option<u32>,
}

impl RenderProxy {
    /// Proxy drawing `kind` at the origin, visible everywhere, not pickable
    pub fn new(kind: ProxyKind) -> Self {
        let key = kind.renderable_key();
        Self {
            kind: Arc::new(kind),
            key,
            transform: Mat4::identity(),
            visibility: VisibilityInfo::default(),
            picking_id: None,
        }
    }

    /// Proxy for a mesh asset
    pub fn mesh(key: impl Into<MeshProtoKey>) -> Self {
        Self::new(ProxyKind::Mesh(key.into()))
    }

    /// Builder-style object-to-world transform
    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Builder-style visibility
    #[must_use]
    pub fn with_visibility(mut self, visibility: VisibilityInfo) -> Self {
        self.visibility = visibility;
        self
    }

    /// Builder-style picking id
    #[must_use]
    pub fn with_picking_id(mut self, id: u32) -> Self {
        self.picking_id = Some(id);
        self
    }

    /// What this proxy draws
    pub fn kind(&self) -> &ProxyKind {
        &self.kind
    }

    /// Shared handle to what this proxy draws
    pub fn shared_kind(&self) -> &Arc<ProxyKind> {
        &self.kind
    }

    /// Renderable cache key
    pub fn key(&self) -> RenderableKey {
        self.key
    }

    /// Object to world
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// View and distance eligibility
    pub fn visibility(&self) -> &VisibilityInfo {
        &self.visibility
    }

    /// Picking id, if pickable
    pub fn picking_id(&self) -> Option<u32> {
        self.picking_id
    }
}

/// Fill of an overlay rectangle
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    /// Flat RGBA color
    Color([f32; 4]),
    /// Texture modulated by an RGBA tint
    Texture {
        /// Texture
        texture: TextureKey,
        /// Tint
        tint: [f32; 4],
    },
}

/// Screen-space rectangle drawn after the 3D pass
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayProxy {
    /// `[x, y, width, height]` in pixels, origin top-left
    pub rect: [f32; 4],
    /// Fill
    pub content: OverlayContent,
    /// Picking id, if pickable
    pub picking_id: Option<u32>,
    /// Views that draw it (distance range is ignored)
    pub visibility: VisibilityInfo,
}

impl OverlayProxy {
    /// Colored rectangle visible in every view
    pub fn colored(rect: [f32; 4], color: [f32; 4]) -> Self {
        Self {
            rect,
            content: OverlayContent::Color(color),
            picking_id: None,
            visibility: VisibilityInfo::default(),
        }
    }

    /// Builder-style picking id
    #[must_use]
    pub fn with_picking_id(mut self, id: u32) -> Self {
        self.picking_id = Some(id);
        self
    }

    /// Whether the pixel coordinate falls inside the rectangle
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let [rx, ry, rw, rh] = self.rect;
        x >= rx && x < rx + rw && y >= ry && y < ry + rh
    }
}

/// One published frame of scene content
#[derive(Debug, Clone, Default)]
pub struct ProxyScene {
    /// 3D content, in submission order
    pub proxies: Vec<RenderProxy>,
    /// Screen-space content, back to front
    pub overlays: Vec<OverlayProxy>,
}

impl ProxyScene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a 3D proxy
    pub fn push(&mut self, proxy: RenderProxy) -> &mut Self {
        self.proxies.push(proxy);
        self
    }

    /// Add an overlay on top of the existing ones
    pub fn push_overlay(&mut self, overlay: OverlayProxy) -> &mut Self {
        self.overlays.push(overlay);
        self
    }
}
