// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration, stored as RON.

use crate::error::ConfigError;
use crate::raster::Resolution;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of cached node output buffers
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default byte budget of the buffer cache (1 GiB)
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 1 << 30;

/// Default byte budget of the buffers one pass keeps alive (8 GiB)
pub const DEFAULT_PASS_BUDGET_BYTES: u64 = 8 << 30;

/// Bytes of one RGBA float buffer at `resolution`
pub fn rgba_buffer_bytes(resolution: Resolution) -> u64 {
    u64::from(resolution.pixels()).pow(2) * 4 * std::mem::size_of::<f32>() as u64
}

/// Resolution and seed of a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Output resolution
    pub resolution: Resolution,
    /// Graph-wide random seed
    pub seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::R1024,
            seed: 0,
        }
    }
}

/// Values used for scalar maps that no output node produces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapDefaults {
    /// Metalness fill
    pub metalness: f32,
    /// Roughness fill
    pub roughness: f32,
    /// Ambient occlusion fill
    pub ao: f32,
    /// Height fill
    pub height: f32,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            metalness: 0.0,
            roughness: 0.5,
            ao: 1.0,
            height: 0.5,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fill values for unproduced scalar maps
    pub map_defaults: MapDefaults,
    /// Maximum number of cached node output buffers
    pub cache_capacity: usize,
    /// Maximum bytes held by cached buffers; least recently used entries
    /// are evicted past it
    pub cache_budget_bytes: u64,
    /// Maximum bytes of buffers a single pass may hold before it aborts
    /// with a resource error
    pub pass_budget_bytes: u64,
    /// Largest resolution a pass may request
    pub max_resolution: Resolution,
    /// Settings used until the editor changes them
    pub render: RenderSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            map_defaults: MapDefaults::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            pass_budget_bytes: DEFAULT_PASS_BUDGET_BYTES,
            max_resolution: Resolution::R4096,
            render: RenderSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from RON text and validate
    pub fn from_ron(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&content)?;
        tracing::info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron()?)?;
        tracing::info!("Saved engine config to {:?}", path);
        Ok(())
    }

    /// Check value ranges and consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.map_defaults;
        for (name, value) in [
            ("metalness", d.metalness),
            ("roughness", d.roughness),
            ("ao", d.ao),
            ("height", d.height),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "map default '{name}' must be within 0..=1, got {value}"
                )));
            }
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.cache_budget_bytes == 0 {
            return Err(ConfigError::Invalid(
                "cache_budget_bytes must be at least 1".to_string(),
            ));
        }
        let largest = rgba_buffer_bytes(self.max_resolution);
        if self.pass_budget_bytes < largest {
            return Err(ConfigError::Invalid(format!(
                "pass_budget_bytes {} cannot hold one {} color buffer ({} bytes)",
                self.pass_budget_bytes, self.max_resolution, largest
            )));
        }
        if self.render.resolution > self.max_resolution {
            return Err(ConfigError::Invalid(format!(
                "default resolution {} exceeds max_resolution {}",
                self.render.resolution, self.max_resolution
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig {
            cache_capacity: 64,
            max_resolution: Resolution::R2048,
            render: RenderSettings {
                resolution: Resolution::R512,
                seed: 42,
            },
            ..Default::default()
        };
        let text = config.to_ron().unwrap();
        assert!(text.contains("2048"));
        assert_eq!(EngineConfig::from_ron(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_ron("(map_defaults: (roughness: 0.8))").unwrap();
        assert_eq!(config.map_defaults.roughness, 0.8);
        assert_eq!(config.map_defaults.ao, 1.0);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cache_budget_bytes, DEFAULT_CACHE_BUDGET_BYTES);
        assert_eq!(config.pass_budget_bytes, DEFAULT_PASS_BUDGET_BYTES);
    }

    #[test]
    fn test_byte_budgets_are_validated() {
        assert!(matches!(
            EngineConfig::from_ron("(cache_budget_bytes: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron("(pass_budget_bytes: 1048576)"),
            Err(ConfigError::Invalid(_))
        ));
        // A 256 px color buffer is 1 MiB
        let config = EngineConfig::from_ron(
            "(pass_budget_bytes: 1048576, max_resolution: 256, render: (resolution: 256))",
        )
        .unwrap();
        assert_eq!(config.pass_budget_bytes, rgba_buffer_bytes(Resolution::R256));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_ron("(map_defaults: (height: 2.0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron("(max_resolution: 512, render: (resolution: 1024))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron("(max_resolution: 333)"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("skinsmith-config-{}.ron", std::process::id()));
        let config = EngineConfig::default();
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
