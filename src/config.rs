use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{matcher::Matcher, quality::QualityGate, session::EnrollmentSession};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("FACEMATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/facematch/config.toml"),
    )
});

pub static STORE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEMATCH_STORE_PREFIX").unwrap_or("/usr/local/etc/facematch"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cosine distance a best-k score must stay below to be accepted.
    pub threshold: f32,
    pub target_sample_count: usize,
    pub min_capture_interval_ms: u64,
    pub top_k: usize,
    /// Degrees.
    pub max_head_yaw: f32,
    /// Degrees.
    pub max_head_roll: f32,
    pub min_eye_open: f32,
    pub model_path: PathBuf,
    pub store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.65,
            target_sample_count: 10,
            min_capture_interval_ms: 600,
            top_k: 3,
            max_head_yaw: 15.0,
            max_head_roll: 15.0,
            min_eye_open: 0.5,
            model_path: STORE_PREFIX.join("mobilefacenet.onnx"),
            store_path: STORE_PREFIX.join("faces.bin"),
        }
    }
}

impl Config {
    pub fn matcher(&self) -> Matcher {
        Matcher::new(self.threshold, self.top_k)
    }

    pub fn session(&self) -> EnrollmentSession {
        EnrollmentSession::new(self.target_sample_count, self.min_capture_interval_ms)
    }

    pub fn quality_gate(&self) -> QualityGate {
        QualityGate {
            max_yaw: self.max_head_yaw,
            max_roll: self.max_head_roll,
            min_eye_open: self.min_eye_open,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = load_config(Some(&dir.path().join("absent.toml")))?;
        assert_eq!(cfg.target_sample_count, 10);
        assert_eq!(cfg.min_capture_interval_ms, 600);
        assert_eq!(cfg.top_k, 3);
        assert!((cfg.threshold - 0.65).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "threshold = 0.7\ntop_k = 5\n")?;
        let cfg = load_config(Some(&path))?;
        assert!((cfg.threshold - 0.7).abs() < 1e-6);
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.target_sample_count, 10);
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            threshold: 0.6,
            target_sample_count: 4,
            ..Config::default()
        };
        save_config(&cfg, Some(&path))?;
        let loaded = load_config(Some(&path))?;
        assert_eq!(loaded.target_sample_count, 4);
        assert!((loaded.threshold - 0.6).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "threshold = \"high\"")?;
        assert!(load_config(Some(&path)).is_err());
        Ok(())
    }
}
