use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // Pipeline
    pub worker_threads: usize,

    // Remote histogram consumer
    pub remote_endpoint: Option<String>,
    pub send_throttle_ms: u64,

    // Diagnostics
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(2),
            remote_endpoint: None,
            send_throttle_ms: 200,
            debug_logging: false,
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "lumaview", "Lumaview") {
            let config_path = proj_dirs.config_dir().join("settings.json");
            if config_path.exists() {
                if let Ok(settings) = Self::load_from(&config_path) {
                    return settings;
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "lumaview", "Lumaview") {
            let config_dir = proj_dirs.config_dir();
            let _ = std::fs::create_dir_all(config_dir);
            if let Err(e) = self.save_to(&config_dir.join("settings.json")) {
                log::warn!("Failed to save settings: {}", e);
            }
        }
    }

    pub fn load_from(path: &Path) -> crate::errors::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| crate::errors::PipelineError::SettingsError {
                message: e.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|e| crate::errors::PipelineError::SettingsError {
            message: e.to_string(),
        })
    }

    pub fn save_to(&self, path: &Path) -> crate::errors::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            crate::errors::PipelineError::SettingsError {
                message: e.to_string(),
            }
        })?;
        std::fs::write(path, content).map_err(|e| crate::errors::PipelineError::SettingsError {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            worker_threads: 3,
            remote_endpoint: Some("https://example.com/histogram".to_string()),
            send_throttle_ms: 500,
            debug_logging: true,
        };
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_is_settings_error() {
        let err = Settings::load_from(Path::new("/nonexistent/settings.json")).unwrap_err();
        assert_eq!(err.error_code(), "SETTINGS_ERROR");
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.worker_threads >= 2);
        assert!(settings.remote_endpoint.is_none());
        assert_eq!(settings.send_throttle_ms, 200);
    }
}
