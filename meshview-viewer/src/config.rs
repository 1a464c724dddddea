//! Viewer configuration (`meshview.toml`)
//!
//! Settings are stored as TOML next to where the viewer is run. Every field
//! has a default, so partial files and missing files both load cleanly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use meshview_core::Color;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "meshview.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewerConfig {
    /// Colours and export settings
    #[serde(default)]
    pub render: RenderConfig,
    /// Stored orbit and input sensitivities
    #[serde(default)]
    pub camera: CameraConfig,
    /// Initial window size for the interactive viewer
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_background")]
    pub background_color: [f32; 3],
    #[serde(default = "default_model_color")]
    pub model_color: [f32; 3],
    /// Exported PNG width in pixels (default: 1024)
    #[serde(default = "default_output_size")]
    pub output_width: u32,
    /// Exported PNG height in pixels (default: 1024)
    #[serde(default = "default_output_size")]
    pub output_height: u32,
    /// Export RGBA with a cleared alpha instead of RGB
    #[serde(default)]
    pub transparent_background: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_yaw")]
    pub yaw: f32,
    #[serde(default = "default_pitch")]
    pub pitch: f32,
    #[serde(default = "default_distance")]
    pub distance: f32,
    /// Frame each loaded mesh instead of applying the stored orbit
    #[serde(default)]
    pub frame_on_load: bool,
    #[serde(default)]
    pub orthographic: bool,
    /// Radians per pixel of pointer drag (default: 0.01)
    #[serde(default = "default_drag_sensitivity")]
    pub drag_sensitivity: f32,
    /// Distance change per wheel line (default: 0.1)
    #[serde(default = "default_zoom_sensitivity")]
    pub zoom_sensitivity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,
    #[serde(default = "default_window_height")]
    pub height: u32,
}

fn default_background() -> [f32; 3] {
    [0.2, 0.3, 0.3]
}
fn default_model_color() -> [f32; 3] {
    [1.0, 0.5, 0.2]
}
fn default_output_size() -> u32 {
    1024
}

fn default_yaw() -> f32 {
    0.8
}
fn default_pitch() -> f32 {
    0.5
}
fn default_distance() -> f32 {
    2.0
}
fn default_drag_sensitivity() -> f32 {
    0.01
}
fn default_zoom_sensitivity() -> f32 {
    0.1
}

fn default_window_width() -> u32 {
    1024
}
fn default_window_height() -> u32 {
    768
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background_color: default_background(),
            model_color: default_model_color(),
            output_width: default_output_size(),
            output_height: default_output_size(),
            transparent_background: false,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            yaw: default_yaw(),
            pitch: default_pitch(),
            distance: default_distance(),
            frame_on_load: false,
            orthographic: false,
            drag_sensitivity: default_drag_sensitivity(),
            zoom_sensitivity: default_zoom_sensitivity(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl RenderConfig {
    pub fn background(&self) -> Color {
        self.background_color.into()
    }

    pub fn model(&self) -> Color {
        self.model_color.into()
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }
}

impl ViewerConfig {
    /// Load configuration from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!(config.render.background_color, [0.2, 0.3, 0.3]);
        assert_eq!(config.render.model_color, [1.0, 0.5, 0.2]);
        assert_eq!(config.render.output_size(), (1024, 1024));
        assert!(!config.render.transparent_background);
        assert_eq!(config.camera.yaw, 0.8);
        assert_eq!(config.camera.pitch, 0.5);
        assert_eq!(config.camera.distance, 2.0);
        assert_eq!(config.camera.drag_sensitivity, 0.01);
        assert_eq!(config.camera.zoom_sensitivity, 0.1);
        assert_eq!((config.window.width, config.window.height), (1024, 768));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ViewerConfig = toml::from_str(
            r#"
            [render]
            output_width = 640
            transparent_background = true

            [camera]
            distance = 7.5
            "#,
        )
        .unwrap();

        assert_eq!(config.render.output_size(), (640, 1024));
        assert!(config.render.transparent_background);
        assert_eq!(config.render.model_color, [1.0, 0.5, 0.2]);
        assert_eq!(config.camera.distance, 7.5);
        assert_eq!(config.camera.yaw, 0.8);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ViewerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[camera]\nyaw = \"north\"\n").unwrap();

        let err = ViewerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut config = ViewerConfig::default();
        config.camera.yaw = -1.25;
        config.camera.orthographic = true;
        config.render.background_color = [0.0, 0.0, 0.0];
        config.save(&path).unwrap();

        assert_eq!(ViewerConfig::load(&path).unwrap(), config);
    }
}
