//! In-memory settings storage.

use std::sync::{
    RwLock,
    atomic::{AtomicUsize, Ordering},
};

use socket_tester_core::{Settings, SettingsStore, StorageError};

/// In-memory storage implementation.
///
/// Useful for tests and throwaway runs. Data is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    settings: RwLock<Settings>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing settings document.
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemoryStorage {
    fn load(&self) -> Result<Settings, StorageError> {
        Ok(self
            .settings
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        *self
            .settings
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))? = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
