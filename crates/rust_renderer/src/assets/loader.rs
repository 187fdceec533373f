//! Loader seams
//!
//! Geometry parsing and image decoding are pluggable. The renderer only ever
//! sees [`MeshData`] and [`DecodedImage`]; any error becomes a placeholder.

use crate::assets::{AssetError, MeshData};
use std::path::{Path, PathBuf};

/// Parses mesh data for a URI
pub trait GeometryLoader: Send + Sync {
    /// Parse the geometry at `uri`
    fn parse(&self, uri: &str) -> Result<MeshData, AssetError>;
}

/// Decodes images for a URI
pub trait TextureDecoder: Send + Sync {
    /// Decode the image at `uri` to RGBA8
    fn decode(&self, uri: &str) -> Result<DecodedImage, AssetError>;
}

impl<F> GeometryLoader for F
where
    F: Fn(&str) -> Result<MeshData, AssetError> + Send + Sync,
{
    fn parse(&self, uri: &str) -> Result<MeshData, AssetError> {
        self(uri)
    }
}

impl<F> TextureDecoder for F
where
    F: Fn(&str) -> Result<DecodedImage, AssetError> + Send + Sync,
{
    fn decode(&self, uri: &str) -> Result<DecodedImage, AssetError> {
        self(uri)
    }
}

/// Decoded RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Image from raw RGBA8 pixels; fails on a size mismatch
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, AssetError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(AssetError::Decode(format!(
                "{width}x{height} image needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self { width, height, rgba })
    }

    /// Image filled with a single color
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            width,
            height,
            rgba: color.repeat(pixel_count),
        }
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether any pixel is not fully opaque
    pub fn has_alpha(&self) -> bool {
        self.rgba.chunks_exact(4).any(|px| px[3] != 255)
    }
}

/// Resolves relative asset URIs against ordered search paths
#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    search_paths: Vec<PathBuf>,
}

impl AssetResolver {
    /// Resolver over the given directories
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// First existing file for `uri`
    ///
    /// Absolute paths and paths that exist relative to the working directory
    /// are used as-is; otherwise each search path is tried in order.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf, AssetError> {
        let direct = Path::new(uri);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        if direct.is_relative() {
            for dir in &self.search_paths {
                let candidate = dir.join(direct);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(AssetError::NotFound(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_tries_search_paths_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("mesh.obj"), "v 0 0 0\n").unwrap();

        let resolver = AssetResolver::new(vec![first.path().into(), second.path().into()]);
        assert_eq!(resolver.resolve("mesh.obj").unwrap(), second.path().join("mesh.obj"));
        assert!(matches!(resolver.resolve("missing.obj"), Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_decoded_image_size_check() {
        assert!(DecodedImage::new(2, 2, vec![0; 16]).is_ok());
        assert!(DecodedImage::new(2, 2, vec![0; 15]).is_err());
        assert!(!DecodedImage::solid_color(4, 4, [1, 2, 3, 255]).has_alpha());
    }
}
