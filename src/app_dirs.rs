use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "keyrate";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", APP_NAME)
            .map(|pd| pd.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("keyrate_config.json"))
    }

    /// Directory the log file goes in. Prefers `$HOME/.local/state` so the
    /// terminal UI never has to share the screen with log output.
    pub fn state_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME)
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|pd| pd.data_local_dir().to_path_buf())
                .unwrap_or_else(std::env::temp_dir)
        }
    }

    pub fn log_path() -> PathBuf {
        Self::state_dir().join("keyrate.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        assert!(AppDirs::config_path().ends_with("config.json"));
        assert_eq!(
            AppDirs::log_path().file_name().unwrap(),
            std::ffi::OsStr::new("keyrate.log")
        );
        assert!(AppDirs::log_path().starts_with(AppDirs::state_dir()));
    }
}
