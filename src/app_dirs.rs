use directories::ProjectDirs;
use std::path::PathBuf;

/// Overrides the data directory, mostly for tests and portable installs.
pub const HOME_ENV: &str = "GYMPROOF_HOME";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn data_dir() -> Option<PathBuf> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(home));
        }
        ProjectDirs::from("", "", "gymproof").map(|dirs| dirs.data_local_dir().to_path_buf())
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("gymproof.db"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("settings.json"))
    }

    /// Default directory for the file-backed remote mirror.
    pub fn mirror_dir() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("mirror"))
    }
}
