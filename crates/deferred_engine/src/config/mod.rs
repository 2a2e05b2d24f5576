//! Renderer configuration
//!
//! Serde-backed configuration loaded from TOML. Values that the original
//! hand-tuned in code (cascade split distances, shadow resolution, frame
//! ring depth) are surfaced here as tunables with validated defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value outside its valid range
    #[error("Invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field
        field: &'static str,
        /// Why the value is rejected
        reason: String,
    },
}

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame-resource ring slots (bounds GPU queue depth)
    pub frames_in_flight: usize,
    /// Prefer a vsync-locked present mode
    pub vsync: bool,
    /// Per-object constant buffer capacity (max draw instances per frame)
    pub max_objects: usize,
    /// Directory holding the compiled SPIR-V shaders
    pub shader_dir: PathBuf,
    /// Shadow mapping configuration
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            vsync: true,
            max_objects: 1024,
            shader_dir: PathBuf::from("resources/shaders"),
            shadow: ShadowConfig::default(),
        }
    }
}

/// Cascaded shadow map configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Depth resolution of each cascade slice (square)
    pub resolution: u32,
    /// Number of cascade slices
    pub cascade_count: usize,
    /// Explicit split distances in view-space depth, strictly increasing.
    /// When absent, splits are derived with the practical split scheme.
    pub splits: Option<Vec<f32>>,
    /// Blend factor between logarithmic (1.0) and uniform (0.0) splits
    pub split_lambda: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 4096,
            cascade_count: 4,
            splits: None,
            split_lambda: 0.75,
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges and cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > 8 {
            return Err(ConfigError::InvalidValue {
                field: "frames_in_flight",
                reason: format!("must be in 1..=8, got {}", self.frames_in_flight),
            });
        }
        if self.max_objects == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_objects",
                reason: "must be non-zero".to_string(),
            });
        }
        self.shadow.validate()
    }
}

impl ShadowConfig {
    /// Validate cascade parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == 0 || !self.resolution.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                field: "shadow.resolution",
                reason: format!("must be a non-zero power of two, got {}", self.resolution),
            });
        }
        if self.cascade_count == 0 || self.cascade_count > crate::render::MAX_CASCADES {
            return Err(ConfigError::InvalidValue {
                field: "shadow.cascade_count",
                reason: format!(
                    "must be in 1..={}, got {}",
                    crate::render::MAX_CASCADES,
                    self.cascade_count
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.split_lambda) {
            return Err(ConfigError::InvalidValue {
                field: "shadow.split_lambda",
                reason: format!("must be in 0.0..=1.0, got {}", self.split_lambda),
            });
        }
        if let Some(splits) = &self.splits {
            if splits.len() != self.cascade_count {
                return Err(ConfigError::InvalidValue {
                    field: "shadow.splits",
                    reason: format!(
                        "expected {} entries to match cascade_count, got {}",
                        self.cascade_count,
                        splits.len()
                    ),
                });
            }
            if splits.windows(2).any(|w| w[1] <= w[0]) || splits[0] <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "shadow.splits",
                    reason: "must be positive and strictly increasing".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = RendererConfig::from_toml(
            r#"
            frames_in_flight = 2
            vsync = false

            [shadow]
            resolution = 2048
            cascade_count = 4
            splits = [20.0, 50.0, 100.0, 1000.0]
            "#,
        )
        .expect("valid config");

        assert_eq!(config.frames_in_flight, 2);
        assert!(!config.vsync);
        assert_eq!(config.shadow.resolution, 2048);
        assert_eq!(
            config.shadow.splits.as_deref(),
            Some(&[20.0, 50.0, 100.0, 1000.0][..])
        );
    }

    #[test]
    fn test_rejects_non_monotonic_splits() {
        let result = RendererConfig::from_toml(
            r#"
            [shadow]
            cascade_count = 3
            splits = [20.0, 20.0, 100.0]
            "#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "shadow.splits", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        let result = RendererConfig::from_toml("frames_in_flight = 0");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "frames_in_flight", .. })
        ));
    }

    #[test]
    fn test_rejects_split_count_mismatch() {
        let result = RendererConfig::from_toml(
            r#"
            [shadow]
            cascade_count = 4
            splits = [20.0, 50.0]
            "#,
        );
        assert!(result.is_err());
    }
}
