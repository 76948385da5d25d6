//! Agent settings loading

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arkvon_core::AgentSettings;
use tracing::debug;

/// User-level settings file (platform-specific)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("arkvon").join("config.toml"))
}

/// Load settings from `explicit`, else the user config file, else defaults.
///
/// An explicit path must exist; the user file is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<AgentSettings> {
    if let Some(path) = explicit {
        return read_settings(path);
    }

    if let Some(path) = user_config_path()
        && path.exists()
    {
        return read_settings(&path);
    }

    debug!("No settings file, using defaults");
    Ok(AgentSettings::default())
}

fn read_settings(path: &Path) -> Result<AgentSettings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings = AgentSettings::from_toml(&contents)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arkvon.toml");
        std::fs::write(
            &path,
            "api_base_url = \"http://localhost:9000/v1\"\ndefault_cookie_days = 10\n",
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.api_base_url, "http://localhost:9000/v1");
        assert_eq!(settings.default_cookie_days, 10);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "retry = 3\n").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }
}
