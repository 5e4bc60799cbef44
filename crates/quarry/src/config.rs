//! Runtime configuration.
//!
//! Loaded from TOML when a file is supplied; every field has a default so
//! an empty file (or no file) yields a working configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::region::Vec3;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Where the resume checkpoint is written.
    pub progress_path: PathBuf,
    /// Home/base position for `go_to_base`; unset means the operation is
    /// rejected with `BaseNotConfigured`.
    pub base: Option<Vec3>,
    /// Keep food at or above this level during mining.
    pub hunger_threshold: u32,
    /// Below this health the run enters the healing sub-state.
    pub critical_health: f32,
    /// Healing ends once health climbs back to this level.
    pub recovered_health: f32,
    /// Below this food level the run enters the healing sub-state; it
    /// ends once food is back at `hunger_threshold`.
    pub critical_food: u32,
    /// Attempts per target before skipping it.
    pub max_attempts: u32,
    /// Persist progress every N targets (in addition to every success).
    pub persist_interval: u64,
    /// Get within this range of a target before digging.
    pub approach_range: f64,
    /// Arm's reach; targets farther than this need an approach first.
    pub reach_distance: f64,
    /// Range that counts as "arrived" at base.
    pub base_range: f64,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            progress_path: PathBuf::from("quarry-progress.json"),
            base: None,
            hunger_threshold: 16,
            critical_health: 8.0,
            recovered_health: 16.0,
            critical_food: 4,
            max_attempts: 3,
            persist_interval: 50,
            approach_range: 2.0,
            reach_distance: 4.5,
            base_range: 2.0,
        }
    }
}

impl QuarryConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QuarryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.persist_interval, 50);
        assert_eq!(config.hunger_threshold, 16);
        assert_eq!(config.critical_food, 4);
        assert!(config.base.is_none());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: QuarryConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.reach_distance, 4.5);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: QuarryConfig = toml::from_str(
            r#"
            max_attempts = 5
            hunger_threshold = 12

            [base]
            x = 100.5
            y = 64.0
            z = -20.0
            "#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.hunger_threshold, 12);
        let base = config.base.unwrap();
        assert_eq!(base.x, 100.5);
        assert_eq!(base.z, -20.0);
        // Untouched fields keep defaults.
        assert_eq!(config.persist_interval, 50);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        std::fs::write(&path, "critical_health = 6.0\n").unwrap();

        let config = QuarryConfig::load(&path).unwrap();
        assert_eq!(config.critical_health, 6.0);
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(QuarryConfig::load("/nonexistent/quarry.toml").is_err());
    }
}
