use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use physics::{PhysicsLimits, PhysicsSettings};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Contents of the optional `--settings` JSON file. Missing sections and
/// fields keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub physics: PhysicsSettings,
    pub limits: PhysicsLimits,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading settings file {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parsing settings file {}", path.display()))?;
        info!(path = %path.display(), "loaded settings");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "physics": {{ "num_velocity_steps": 6 }}, "limits": {{ "max_bodies": 16 }} }}"#).unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.physics.num_velocity_steps, 6);
        assert_eq!(config.physics.baumgarte, PhysicsSettings::default().baumgarte);
        assert_eq!(config.limits.max_bodies, 16);
        assert_eq!(config.limits.max_body_pairs, PhysicsLimits::default().max_body_pairs);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RuntimeConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading settings file"));
    }
}
