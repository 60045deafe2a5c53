//! Settings storage backends.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "file")]
pub use file::FileStorage;

use socket_tester_core::{Settings, SettingsStore};
use tracing::warn;

/// Load settings, falling back to defaults when the store cannot provide
/// them.
pub fn load_or_default<S: SettingsStore + ?Sized>(store: &S) -> Settings {
    store.load().unwrap_or_else(|e| {
        warn!("using default settings: {e}");
        Settings::default()
    })
}
