//! Core traits for connection events and settings storage.

use thiserror::Error;

use crate::{ConnectionStatus, Settings};

/// Receives transport session notifications.
///
/// All methods are called on the thread driving the session, in the order
/// the transport reported the underlying events.
pub trait ConnectionObserver {
    /// The connection opened.
    fn on_open(&mut self);

    /// The connection closed with a close code and reason.
    fn on_close(&mut self, code: u16, reason: &str);

    /// A text frame arrived.
    fn on_message(&mut self, payload: &str);

    /// Something failed. The description is user-facing.
    fn on_error(&mut self, description: &str);

    /// A write failed on a connection that is still up. Unlike `on_error`
    /// this is not a status change.
    fn on_send_error(&mut self, description: &str) {
        self.on_error(description);
    }

    /// The session status changed, or a reconnect is starting.
    fn on_status_change(&mut self, status: ConnectionStatus);
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings document: {0}")]
    Parse(String),
    #[error("Failed to serialize settings: {0}")]
    Serialize(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for settings storage backends.
pub trait SettingsStore {
    /// Load the settings document, or defaults if none was saved.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn load(&self) -> Result<Settings, StorageError>;

    /// Persist the settings document.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn save(&self, settings: &Settings) -> Result<(), StorageError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn load(&self) -> Result<Settings, StorageError> {
        (**self).load()
    }

    fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        (**self).save(settings)
    }
}
