use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "facegate")
}

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEGATE_CONFIG_PATH") {
    Some(path) => PathBuf::from(path),
    None => project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("facegate.toml")),
});

pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEGATE_DATA_DIR") {
    Some(path) => PathBuf::from(path),
    None => project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("facegate-data")),
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Largest embedding distance still accepted as the same person.
    pub threshold: f32,
    /// Webcam device node.
    pub camera: String,
    /// Pause between opening the camera and grabbing the frame.
    pub capture_delay_ms: u64,
    /// Serialized enrollment store.
    pub store_path: PathBuf,
    /// Root of the per-user reference images.
    pub users_dir: PathBuf,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    /// Minimum detector confidence.
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let data = DATA_DIR.as_path();
        Self {
            threshold: 0.6,
            camera: "/dev/video0".to_string(),
            capture_delay_ms: 2000,
            store_path: data.join("encodings.bin"),
            users_dir: data.join("users"),
            detector_model: data.join("models/face_detection_yunet_2023mar.onnx"),
            recognizer_model: data.join("models/face_recognition_sface_2021dec.onnx"),
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

impl Config {
    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    if !(cfg.threshold.is_finite() && cfg.threshold >= 0.0) {
        anyhow::bail!("threshold must be a non-negative number, got {}", cfg.threshold);
    }
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(CONFIG_PATH.as_path());
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
