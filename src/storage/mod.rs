//! Storage Layer
//!
//! Platform directory for the configuration file.

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "handwriting", "HandwritingRecognizer")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
