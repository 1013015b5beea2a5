//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::preprocess::{GrayscaleMode, InkConvention, PreprocessMode};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Preprocessing pipeline settings
    pub preprocess: PreprocessSettings,
    /// Classifier model settings
    pub model: ModelSettings,
    /// Preview rendering settings
    pub preview: PreviewSettings,
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.preprocess.target_size == 0 {
            bail!("preprocess.target_size must be greater than zero");
        }
        if self.preview.scale == 0 {
            bail!("preview.scale must be greater than zero");
        }
        if self.model.intra_threads == 0 {
            bail!("model.intra_threads must be greater than zero");
        }
        Ok(())
    }
}

/// Preprocessing pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Crop to the ink before resizing, or resize the whole canvas
    pub mode: PreprocessMode,
    /// Intensity at or above which a pixel counts as background (0-255)
    pub background_threshold: u8,
    /// Padding kept around the ink bounding box, in pixels
    pub margin: u32,
    /// Side length of the square classifier input
    pub target_size: u32,
    /// Which way round ink and background are drawn
    pub ink: InkConvention,
    /// How RGB is reduced to a single intensity channel
    pub grayscale: GrayscaleMode,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            mode: PreprocessMode::Enhanced,
            background_threshold: 250,
            margin: 5,
            target_size: 32,
            ink: InkConvention::DarkOnLight,
            grayscale: GrayscaleMode::Red,
        }
    }
}

/// Classifier model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the ONNX classifier
    pub path: PathBuf,
    /// Where to download the model from when `path` does not exist
    pub url: Option<String>,
    /// Expected SHA-256 of the model file (hex)
    pub sha256: Option<String>,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Label table file (JSON array or one label per line); built-in table when unset
    pub labels_path: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model/model.onnx"),
            url: None,
            sha256: None,
            intra_threads: 1,
            labels_path: None,
        }
    }
}

/// Preview rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Write the preprocessed preview image
    pub enabled: bool,
    /// Output path for the preview PNG
    pub path: PathBuf,
    /// Integer upscale factor for display
    pub scale: u32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("preview.png"),
            scale: 8,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
