//! Core model for the socket tester.
//!
//! This crate provides the fundamental building blocks:
//! - `MessageLog` - Bounded session log with eviction and autoscroll
//! - `SessionRecord` / `LogEntry` - Typed log entries
//! - `ComposerHistory` - Submitted-message history with navigation
//! - `Settings` - Persisted configuration document
//! - Observer and settings storage traits

pub mod composer;
pub mod log_msg;
pub mod msg_store;
pub mod settings;
pub mod status;
pub mod traits;

pub use composer::ComposerHistory;
pub use log_msg::{Direction, LogEntry, NoticeKind, SessionRecord};
pub use msg_store::{LogConfig, MessageLog};
pub use settings::{
    ACCEPTED_SCHEMES, Endpoint, Settings, TimestampFormat, ValidationError, validate_address,
};
pub use status::{ConnectionStatus, status_bar_text, status_text};
pub use traits::{ConnectionObserver, SettingsStore, StorageError};
