//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// File-backed configuration. The format is picked from the extension.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !is_toml(path) {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !is_toml(path) {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Where per-tile light lists are built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullingMode {
    /// Compute dispatch on its own command buffer
    #[default]
    Gpu,
    /// Built on the CPU and uploaded
    Cpu,
}

/// Which lights survive when more are submitted than fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationPolicy {
    /// Closest to the camera first, ties in submission order
    #[default]
    NearestFirst,
    /// Submission order
    InsertionOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardPlusConfig {
    /// Size of screen tiles for light culling (pixels)
    pub tile_size: u32,
    /// Maximum number of lights uploaded per frame
    pub max_lights: u32,
    /// Maximum number of light indices stored per tile
    pub max_lights_per_tile: u32,
    pub culling: CullingMode,
    pub truncation: TruncationPolicy,
    /// Also build tile lists on the CPU in GPU mode, for inspection
    pub cpu_preview: bool,
}

impl Default for ForwardPlusConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            max_lights: 1024,
            max_lights_per_tile: 256,
            culling: CullingMode::Gpu,
            truncation: TruncationPolicy::NearestFirst,
            cpu_preview: false,
        }
    }
}

impl ForwardPlusConfig {
    pub const MAX_TILE_SIZE: u32 = 256;

    /// Clamp every field into its usable range
    pub fn validated(&self) -> Self {
        let max_lights = self.max_lights.max(1);
        Self {
            tile_size: self.tile_size.clamp(1, Self::MAX_TILE_SIZE),
            max_lights,
            max_lights_per_tile: self.max_lights_per_tile.clamp(1, max_lights),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub clear_color: [f32; 4],
    pub forward_plus: ForwardPlusConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "ZDL Engine".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            forward_plus: ForwardPlusConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            title = "demo"
            [forward_plus]
            tile_size = 32
            culling = "cpu"
            "#,
        )
        .unwrap();
        assert_eq!(config.title, "demo");
        assert_eq!(config.width, 1280);
        assert_eq!(config.forward_plus.tile_size, 32);
        assert_eq!(config.forward_plus.culling, CullingMode::Cpu);
        assert_eq!(config.forward_plus.max_lights_per_tile, 256);
    }

    #[test]
    fn validated_clamps() {
        let config = ForwardPlusConfig {
            tile_size: 0,
            max_lights: 8,
            max_lights_per_tile: 64,
            ..Default::default()
        }
        .validated();
        assert_eq!(config.tile_size, 1);
        assert_eq!(config.max_lights_per_tile, 8);
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("zdl-config-{}.toml", std::process::id()));
        let mut config = EngineConfig::default();
        config.forward_plus.truncation = TruncationPolicy::InsertionOrder;
        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);

        assert!(matches!(
            EngineConfig::load_from_file("engine.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
