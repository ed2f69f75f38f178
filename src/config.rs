use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder shown while a thumbnail has not been resolved yet.
pub const LOADING_PLACEHOLDER: &str = "resources/noloading.png";

/// Placeholder shown when a thumbnail could not be generated.
pub const FAILED_PLACEHOLDER: &str = "resources/failed.png";

const CONFIG_ENV: &str = "VRC_ALBUM_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_folder_path")]
    pub folder_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,

    /// Each side of the source is divided by this value (integer division, at least 1px).
    #[serde(default = "default_scale_divisor")]
    pub scale_divisor: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Regenerate a derivative whose source has a newer mtime.
    #[serde(default)]
    pub invalidate_on_source_change: bool,

    #[serde(default = "default_loading_placeholder")]
    pub loading_placeholder: PathBuf,

    #[serde(default = "default_failed_placeholder")]
    pub failed_placeholder: PathBuf,
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("vrc-album/thumbnails")
}

fn default_scale_divisor() -> u32 {
    8
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_loading_placeholder() -> PathBuf {
    PathBuf::from(LOADING_PLACEHOLDER)
}

fn default_failed_placeholder() -> PathBuf {
    PathBuf::from(FAILED_PLACEHOLDER)
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
            scale_divisor: default_scale_divisor(),
            jpeg_quality: default_jpeg_quality(),
            invalidate_on_source_change: false,
            loading_placeholder: default_loading_placeholder(),
            failed_placeholder: default_failed_placeholder(),
        }
    }
}

fn default_folder_path() -> PathBuf {
    // VRChat drops screenshots under Pictures/VRChat
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("VRChat")
}

fn default_image_extensions() -> Vec<String> {
    vec!["png".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder_path: default_folder_path(),
            scanner: ScannerConfig::default(),
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load an explicit settings file. `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let config = if is_toml(path) {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML settings in {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON settings in {}", path.display()))?
        };

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vrc-album")
    }

    fn config_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::config_dir().join("settings.json"),
        }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}
