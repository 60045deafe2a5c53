//! TOML file settings storage.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use socket_tester_core::{Settings, SettingsStore, StorageError};
use tracing::{debug, info};

const APP_DIR: &str = "socket-tester";
const FILE_NAME: &str = "settings.toml";

/// Settings stored as a TOML document on disk.
///
/// Writes go to a sibling temp file that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/socket-tester/settings.toml`, if the platform has a
    /// config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsStore for FileStorage {
    fn load(&self) -> Result<Settings, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings: Settings =
            toml::from_str(&text).map_err(|e| StorageError::Parse(e.to_string()))?;
        settings
            .validate()
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let text =
            toml::to_string_pretty(settings).map_err(|e| StorageError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, text)?;
        fs::rename(&temp, &self.path)?;

        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}
