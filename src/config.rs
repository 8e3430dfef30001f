use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the Pulse-Compositor engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Render pass settings
    pub render: RenderConfig,

    /// Audio analysis settings
    pub audio: AudioConfig,

    /// Palette animation settings
    pub palette: PaletteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            audio: AudioConfig::default(),
            palette: PaletteConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string(),
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.render.validate()?;
        self.audio.validate()?;
        self.palette.validate()?;
        Ok(())
    }
}

/// Render pass configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Output surface width in pixels
    pub width: u32,

    /// Output surface height in pixels
    pub height: u32,

    /// Target frame rate for the render scheduler
    pub fps: f64,

    /// Preview surface viewport
    pub preview: PreviewConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60.0,
            preview: PreviewConfig::default(),
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.dimensions".to_string(),
                value: format!("{}x{}", self.width, self.height),
            }
            .into());
        }

        if self.fps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "render.fps".to_string(),
                value: self.fps.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Viewport rectangle the output surface is scaled into for the preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 320,
            height: 180,
        }
    }
}

/// Audio analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate for analysis (Hz)
    pub sample_rate: u32,

    /// Window size for FFT analysis
    pub window_size: usize,

    /// Minimum BPM to detect
    pub min_bpm: f64,

    /// Maximum BPM to detect
    pub max_bpm: f64,

    /// Beat detection sensitivity (0.0-1.0)
    pub beat_sensitivity: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 1024,
            min_bpm: 85.0,
            max_bpm: 169.0,
            beat_sensitivity: 0.7,
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "audio.sample_rate".to_string(),
                value: self.sample_rate.to_string(),
            }
            .into());
        }

        if self.window_size == 0 || !self.window_size.is_power_of_two() {
            return Err(ConfigError::InvalidValue {
                key: "audio.window_size".to_string(),
                value: self.window_size.to_string(),
            }
            .into());
        }

        if self.min_bpm >= self.max_bpm {
            return Err(ConfigError::InvalidValue {
                key: "audio.bpm_range".to_string(),
                value: format!("{}-{}", self.min_bpm, self.max_bpm),
            }
            .into());
        }

        Ok(())
    }
}

/// Palette animation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaletteConfig {
    /// Worker tick rate (ticks per second)
    pub tick_rate: f64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self { tick_rate: 60.0 }
    }
}

impl PaletteConfig {
    fn validate(&self) -> Result<()> {
        if self.tick_rate <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "palette.tick_rate".to_string(),
                value: self.tick_rate.to_string(),
            }
            .into());
        }

        Ok(())
    }
}
