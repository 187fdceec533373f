//! Asset loading and the geometry-data cache
//!
//! Everything in here is backend independent. Parsed meshes and decoded
//! images are plain CPU data; GPU residency is handled by the render module.

pub mod compress;
pub mod image_decoder;
pub mod keys;
pub mod loader;
pub mod loader_pool;
pub mod mesh_data;
pub mod mesh_data_cache;
pub mod obj_loader;

pub use image_decoder::ImageDecoder;
pub use keys::{MeshProtoKey, TexFlags, TextureKey};
pub use loader::{AssetResolver, DecodedImage, GeometryLoader, TextureDecoder};
pub use loader_pool::LoaderPool;
pub use mesh_data::{Material, MeshData, Primitive, SubMesh};
pub use mesh_data_cache::MeshDataCache;
pub use obj_loader::ObjLoader;

use thiserror::Error;

/// Asset loading errors
///
/// None of these are fatal to the renderer: a failed mesh or texture is
/// replaced by a placeholder.
#[derive(Error, Debug, Clone)]
pub enum AssetError {
    /// Asset not found on any search path
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed geometry file
    #[error("Parse error in {uri}, line {line}: {reason}")]
    Parse {
        /// Asset URI
        uri: String,
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Image could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
