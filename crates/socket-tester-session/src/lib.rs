//! Session orchestration and settings storage for the socket tester.
//!
//! Provides:
//! - `SessionController` - Connect/send/disconnect/clear, status and endpoints
//! - `SessionView` - The controller's observer half
//! - Storage implementations (memory, TOML file)

pub mod manager;
pub mod storage;
pub mod view;

pub use manager::{Command, ControllerError, SessionController};
pub use view::{SessionView, ViewState};
