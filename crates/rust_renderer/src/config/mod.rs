//! Configuration system
//!
//! Tunables for the renderer: GPU memory reclamation windows, texture
//! compression policy, picking tolerance, culling, and asset search paths.
//! Every section has working defaults; files may override any subset.

pub use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its legal range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// GPU memory reclamation windows
///
/// A resource is freed only once it has gone unbound for longer than
/// `time_threshold_secs` AND for more than `frame_threshold` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Wall-clock idle time before a resource becomes eligible for eviction
    pub time_threshold_secs: f32,
    /// Frame count idle window before a resource becomes eligible for eviction
    pub frame_threshold: u64,
}

impl MemoryConfig {
    /// Time threshold as a [`Duration`]
    pub fn time_threshold(&self) -> Duration {
        Duration::from_secs_f32(self.time_threshold_secs.max(0.0))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            time_threshold_secs: 10.0,
            frame_threshold: 100,
        }
    }
}

/// Texture streaming policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Uncompressed textures with more pixels than this are block-compressed
    pub force_compress_above_pixels: u64,
    /// Number of background loader threads shared by mesh and texture loads
    pub loader_threads: usize,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            force_compress_above_pixels: 2048 * 2048,
            loader_threads: 2,
        }
    }
}

/// Picking tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Half-angle of the cone around a pick ray used for lines and points
    pub cone_half_angle_degrees: f32,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            cone_half_angle_degrees: 0.5,
        }
    }
}

/// Culling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Objects whose projected diameter is below this many pixels are skipped
    pub min_pixel_size: f32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            min_pixel_size: 1.0,
        }
    }
}

/// Asset lookup
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directories searched (in order) for relative asset URIs
    pub search_paths: Vec<PathBuf>,
}

/// Top-level renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// GPU memory reclamation
    pub memory: MemoryConfig,
    /// Texture streaming
    pub textures: TextureConfig,
    /// Picking tolerances
    pub picking: PickingConfig,
    /// Culling policy
    pub culling: CullingConfig,
    /// Asset lookup
    pub assets: AssetConfig,
    /// RGBA clear color for windows and offscreen targets
    pub clear_color: [f32; 4],
    /// How long the idle render thread sleeps before running eviction and
    /// texture uploads without drawing
    pub idle_wait_millis: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            textures: TextureConfig::default(),
            picking: PickingConfig::default(),
            culling: CullingConfig::default(),
            assets: AssetConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            idle_wait_millis: 250,
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Reject values the renderer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.memory.time_threshold_secs >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "memory.time_threshold_secs",
                reason: format!("must be >= 0, got {}", self.memory.time_threshold_secs),
            });
        }
        if self.textures.loader_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "textures.loader_threads",
                reason: "at least one loader thread is required".to_string(),
            });
        }
        let angle = self.picking.cone_half_angle_degrees;
        if !(angle > 0.0 && angle < 90.0) {
            return Err(ConfigError::Invalid {
                field: "picking.cone_half_angle_degrees",
                reason: format!("must be in (0, 90), got {angle}"),
            });
        }
        if !(self.culling.min_pixel_size >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "culling.min_pixel_size",
                reason: format!("must be >= 0, got {}", self.culling.min_pixel_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_cone_angle() {
        let mut config = RendererConfig::default();
        config.picking.cone_half_angle_degrees = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        std::fs::write(&path, "[memory]\nframe_threshold = 7\n").unwrap();

        let config = RendererConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.memory.frame_threshold, 7);
        assert_eq!(config.textures, TextureConfig::default());

        config.save_to_file(path.to_str().unwrap()).unwrap();
        let reloaded = RendererConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            RendererConfig::load_from_file("renderer.yaml"),
            Err(ConfigError::Io(_)) | Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
