use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::counter::Thresholds;
use crate::diet::DietConfig;
use crate::live::LiveConfig;
use crate::pose::PoseModelConfig;
use crate::rendering::OverlayConfig;

/// Everything the coach reads from `coach.toml`.  Every section and field
/// has a default, so a partial file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub pose: PoseModelConfig,
    pub thresholds: Thresholds,
    pub live: LiveConfig,
    pub diet: DietConfig,
    pub overlay: OverlayConfig,
}

impl CoachConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: CoachConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate().context("[thresholds]")?;

        if self.pose.input_size == 0 {
            bail!("[pose] input_size must be positive");
        }
        if self.pose.values_per_landmark < 3 {
            bail!(
                "[pose] values_per_landmark must be at least 3 (x, y, z), got {}",
                self.pose.values_per_landmark
            );
        }
        if !(0.0..=1.0).contains(&self.pose.presence_threshold) {
            bail!(
                "[pose] presence_threshold must be within [0, 1], got {}",
                self.pose.presence_threshold
            );
        }
        if self.diet.model.trim().is_empty() {
            bail!("[diet] model must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::TensorLayout;

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.toml");

        let mut config = CoachConfig::default();
        config.live.frame_delay_ms = 33;
        config.pose.layout = TensorLayout::Nchw;
        config.thresholds.squat.up_left_above = 265.0;
        config.save(&path).unwrap();

        assert_eq!(CoachConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.toml");
        fs::write(
            &path,
            "[live]\ncamera_index = 2\n\n[thresholds.push_up]\ndown_below = 120.0\n",
        )
        .unwrap();

        let config = CoachConfig::load(&path).unwrap();
        assert_eq!(config.live.camera_index, 2);
        assert_eq!(config.live.frame_delay_ms, 100);
        assert_eq!(config.thresholds.push_up.down_below, 120.0);
        assert_eq!(config.thresholds.push_up.up_above, 250.0);
        assert_eq!(config.diet.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoachConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CoachConfig::default());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.toml");
        fs::write(
            &path,
            "[thresholds.bicep_curl]\ndown_below = 320.0\nup_above = 310.0\n",
        )
        .unwrap();
        let err = CoachConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bicep_curl"));
    }

    #[test]
    fn test_nan_threshold_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.toml");
        fs::write(&path, "[thresholds.push_up]\nup_above = nan\n").unwrap();
        let err = CoachConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("push_up.up_above"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.toml");
        fs::write(&path, "[live\ncamera_index = ").unwrap();
        assert!(CoachConfig::load(&path).is_err());
    }

    #[test]
    fn test_rendered_toml_has_every_section() {
        let text = CoachConfig::default().to_toml().unwrap();
        for section in ["[pose]", "[thresholds.squat]", "[live]", "[diet]"] {
            assert!(text.contains(section), "missing {section} in\n{text}");
        }
    }

    #[test]
    fn test_presence_threshold_range() {
        let mut config = CoachConfig::default();
        config.pose.presence_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
