//! Observer side of the controller: everything a transport callback touches.

use socket_tester_core::{
    ConnectionObserver, ConnectionStatus, MessageLog, NoticeKind, SessionRecord, Settings,
    SettingsStore, StorageError,
};
use tracing::{debug, error, info};

/// Connection state as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub status: ConnectionStatus,
    /// Saved endpoint name of the connected address.
    pub connection_name: Option<String>,
    pub error: Option<String>,
}

impl ViewState {
    #[must_use]
    pub fn with_status(status: ConnectionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Connected or on the way there.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        )
    }
}

/// Log, settings and user-facing state, updated by transport callbacks.
pub struct SessionView<St> {
    pub(crate) log: MessageLog,
    pub(crate) settings: Settings,
    pub(crate) store: St,
    pub(crate) state: ViewState,
    /// Id of the saved endpoint the address came from.
    pub(crate) selected: Option<String>,
    pub(crate) address: String,
}

impl<St: SettingsStore> SessionView<St> {
    pub(crate) fn persist(&self) -> Result<(), StorageError> {
        self.store.save(&self.settings).inspect_err(|e| {
            error!("failed to save settings: {e}");
        })
    }

    pub(crate) fn notice(&mut self, text: impl Into<String>, kind: NoticeKind) {
        self.log.add_notice(text, kind);
    }
}

impl<St: SettingsStore> ConnectionObserver for SessionView<St> {
    fn on_open(&mut self) {
        self.state = ViewState {
            status: ConnectionStatus::Connected,
            connection_name: self
                .settings
                .endpoint_name_for(&self.address)
                .map(str::to_string),
            error: None,
        };
        self.notice("Connected", NoticeKind::Success);

        if let Some(id) = self.selected.clone() {
            info!(endpoint = %id, "remembering last endpoint");
            self.settings.last_connection_id = id;
            if let Err(e) = self.persist() {
                self.notice(format!("Failed to save settings: {e}"), NoticeKind::Error);
            }
        }
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        let was_connected = self.state.status == ConnectionStatus::Connected;
        self.state = ViewState::with_status(ConnectionStatus::Disconnected);

        if was_connected {
            let text = if reason.is_empty() {
                format!("Disconnected (code: {code})")
            } else {
                format!("Disconnected (code: {code}) - {reason}")
            };
            self.notice(text, NoticeKind::Info);
        }
    }

    fn on_message(&mut self, payload: &str) {
        self.log.add(SessionRecord::received(payload));
    }

    fn on_error(&mut self, description: &str) {
        self.state = ViewState {
            status: ConnectionStatus::Error,
            connection_name: None,
            error: Some(description.to_string()),
        };
        self.notice(format!("Error: {description}"), NoticeKind::Error);
    }

    fn on_send_error(&mut self, description: &str) {
        self.notice(format!("Error: {description}"), NoticeKind::Error);
    }

    fn on_status_change(&mut self, status: ConnectionStatus) {
        debug!(?status, "transport status");
        // The controller moves to Connecting itself for user-initiated
        // connects, so a Connecting broadcast seen here is a retry.
        match (status, self.state.status) {
            (ConnectionStatus::Connecting, current) if current != ConnectionStatus::Connecting => {
                self.state = ViewState::with_status(ConnectionStatus::Connecting);
                self.notice("Reconnecting...", NoticeKind::Info);
            }
            // A pending connect or retry was abandoned. Connected state is
            // left to `on_close`, which follows.
            (ConnectionStatus::Disconnected, ConnectionStatus::Connecting) => {
                self.state = ViewState::with_status(ConnectionStatus::Disconnected);
            }
            _ => {}
        }
    }
}
