//! File-backed image decoding through the `image` crate

use crate::assets::{AssetError, AssetResolver, DecodedImage, TextureDecoder};

/// Decodes PNG and JPEG files to RGBA8
#[derive(Debug, Clone, Default)]
pub struct ImageDecoder {
    resolver: AssetResolver,
}

impl ImageDecoder {
    /// Decoder looking up files through `resolver`
    pub fn new(resolver: AssetResolver) -> Self {
        Self { resolver }
    }

    /// Decode an in-memory encoded image
    pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::Decode(format!("Failed to decode image from bytes: {e}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        DecodedImage::new(width, height, rgba.into_raw())
    }
}

impl TextureDecoder for ImageDecoder {
    fn decode(&self, uri: &str) -> Result<DecodedImage, AssetError> {
        let path = self.resolver.resolve(uri)?;
        log::debug!("Decoding image from: {:?}", path);

        let img = image::open(&path)
            .map_err(|e| AssetError::Decode(format!("Failed to load image {uri}: {e}")))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("Decoded image {}x{} from {:?}", width, height, path);
        DecodedImage::new(width, height, rgba.into_raw())
    }
}
