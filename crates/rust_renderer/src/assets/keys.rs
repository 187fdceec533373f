//! Asset cache keys

use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Texture sampling and storage options
    ///
    /// Part of [`TextureKey`]: the same image requested with different flags
    /// is a different GPU texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TexFlags: u32 {
        /// Generate a mip chain
        const MIPMAPS = 1 << 0;
        /// Linear (rather than nearest) filtering
        const LINEAR = 1 << 1;
        /// Clamp to edge instead of repeating
        const CLAMP = 1 << 2;
        /// Never block-compress, whatever the size
        const NO_COMPRESSION = 1 << 3;
    }
}

/// Key of a mesh prototype: the geometry URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshProtoKey {
    uri: Arc<str>,
}

impl MeshProtoKey {
    /// Key for a geometry URI
    pub fn new(uri: impl AsRef<str>) -> Self {
        Self {
            uri: Arc::from(uri.as_ref()),
        }
    }

    /// Geometry URI
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for MeshProtoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl From<&str> for MeshProtoKey {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

/// Key of a GPU texture: image URI plus flags
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    uri: Arc<str>,
    flags: TexFlags,
}

impl TextureKey {
    /// Key for an image URI with the given flags
    pub fn new(uri: impl AsRef<str>, flags: TexFlags) -> Self {
        Self {
            uri: Arc::from(uri.as_ref()),
            flags,
        }
    }

    /// Image URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Sampling and storage flags
    pub fn flags(&self) -> TexFlags {
        self.flags
    }
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}]", self.uri, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_value_equal() {
        assert_eq!(MeshProtoKey::new("a.obj"), MeshProtoKey::from("a.obj"));

        let mut set = HashSet::new();
        set.insert(TextureKey::new("t.png", TexFlags::LINEAR));
        assert!(set.contains(&TextureKey::new("t.png", TexFlags::LINEAR)));
        assert!(!set.contains(&TextureKey::new("t.png", TexFlags::empty())));
    }
}
