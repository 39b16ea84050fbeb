use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timeline::{StripLayout, DEFAULT_TRIM_WINDOW, THUMBNAIL_COUNT};

pub const CONFIG_ENV: &str = "MEDIA_CONVERTER_CONFIG";
pub const FFMPEG_ENV: &str = "FFMPEG_PATH";
pub const FFPROBE_ENV: &str = "FFPROBE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub default_quality: u8,
    pub max_image_files: usize,
    pub thumbnail_count: u32,
    pub strip_width: u32,
    pub strip_height: u32,
    pub trim_window: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            ffmpeg_path: None,
            ffprobe_path: None,
            output_dir: dirs::download_dir().unwrap_or_else(std::env::temp_dir),
            default_quality: 80,
            max_image_files: 10,
            thumbnail_count: THUMBNAIL_COUNT,
            strip_width: 600,
            strip_height: 64,
            trim_window: DEFAULT_TRIM_WINDOW,
        }
    }
}

impl AppConfig {
    /// Explicit path, then `$MEDIA_CONVERTER_CONFIG`, then the per-user
    /// config file. A missing file means defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match candidate {
            Some(p) if p.exists() => {
                info!("loading configuration from {}", p.display());
                Self::from_file(&p)?
            }
            _ => {
                debug!("no configuration file, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn apply_env(&mut self) {
        if let Some(p) = std::env::var_os(FFMPEG_ENV) {
            self.ffmpeg_path = Some(PathBuf::from(p));
        }
        if let Some(p) = std::env::var_os(FFPROBE_ENV) {
            self.ffprobe_path = Some(PathBuf::from(p));
        }
    }

    pub fn strip_layout(&self) -> StripLayout {
        StripLayout {
            width: self.strip_width,
            height: self.strip_height,
            count: self.thumbnail_count,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("media-converter").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "default_quality": 60, "output_dir": "/tmp/converted" }"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.default_quality, 60);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/converted"));
        assert_eq!(config.max_image_files, 10);
        assert_eq!(config.strip_layout(), StripLayout::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
