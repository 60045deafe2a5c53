//! Connection status and its user-facing text.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a transport session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Single-line summary for the session view.
///
/// `name` is the saved endpoint name when connected to one; `error` is the
/// last reported failure.
#[must_use]
pub fn status_text(status: ConnectionStatus, name: Option<&str>, error: Option<&str>) -> String {
    match status {
        ConnectionStatus::Disconnected => "Disconnected".to_string(),
        ConnectionStatus::Connecting => "Connecting...".to_string(),
        ConnectionStatus::Connected => match name {
            Some(name) => format!("Connected to {name}"),
            None => "Connected".to_string(),
        },
        ConnectionStatus::Error => format!("Error: {}", error.unwrap_or("Unknown")),
    }
}

/// Compact text for a status bar.
#[must_use]
pub const fn status_bar_text(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "WS: Offline",
        ConnectionStatus::Connecting => "WS: Connecting...",
        ConnectionStatus::Connected => "WS: Connected",
        ConnectionStatus::Error => "WS: Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(
            status_text(ConnectionStatus::Disconnected, None, None),
            "Disconnected"
        );
        assert_eq!(
            status_text(ConnectionStatus::Connecting, Some("Echo"), None),
            "Connecting..."
        );
        assert_eq!(
            status_text(ConnectionStatus::Connected, Some("Echo"), None),
            "Connected to Echo"
        );
        assert_eq!(
            status_text(ConnectionStatus::Connected, None, None),
            "Connected"
        );
        assert_eq!(
            status_text(ConnectionStatus::Error, None, Some("refused")),
            "Error: refused"
        );
        assert_eq!(
            status_text(ConnectionStatus::Error, None, None),
            "Error: Unknown"
        );
    }

    #[test]
    fn test_status_bar_text() {
        assert_eq!(status_bar_text(ConnectionStatus::Disconnected), "WS: Offline");
        assert_eq!(status_bar_text(ConnectionStatus::Connected), "WS: Connected");
    }
}
