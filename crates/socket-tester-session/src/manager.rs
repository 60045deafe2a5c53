//! Session controller: turns user intent into transport calls and keeps the
//! log, status and settings in step with what the transport reports.

use socket_tester_core::{
    ComposerHistory, ConnectionStatus, Endpoint, LogConfig, MessageLog, NoticeKind,
    SessionRecord, Settings, SettingsStore, StorageError, ValidationError, status_bar_text,
    status_text, validate_address,
};
use socket_tester_transport::{
    Connector, DriverEvent, ReconnectConfig, Scheduler, TransportSession,
};
use tracing::{debug, info};

use crate::{
    storage::load_or_default,
    view::{SessionView, ViewState},
};

/// Controller error.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Not connected")]
    NotConnected,
    #[error("Failed to send message")]
    SendFailed,
    #[error("Cannot change endpoint while connected")]
    Busy,
}

/// Zero-argument commands exposed to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OpenView,
    Disconnect,
    ClearLog,
}

impl Command {
    pub const ALL: [Self; 3] = [Self::OpenView, Self::Disconnect, Self::ClearLog];

    /// Stable identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::OpenView => "open-websocket-tester",
            Self::Disconnect => "websocket-disconnect",
            Self::ClearLog => "websocket-clear-log",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::OpenView => "Open WebSocket Tester",
            Self::Disconnect => "Disconnect WebSocket",
            Self::ClearLog => "Clear WebSocket message log",
        }
    }
}

/// One tester session: a transport, its message log and the composer.
pub struct SessionController<C, S, St>
where
    C: Connector,
    S: Scheduler,
    St: SettingsStore,
{
    transport: TransportSession<C, S>,
    view: SessionView<St>,
    composer: ComposerHistory,
    open: bool,
}

impl<C, S, St> SessionController<C, S, St>
where
    C: Connector,
    S: Scheduler,
    St: SettingsStore,
{
    /// Create a controller with settings loaded from `store`.
    ///
    /// The last used endpoint, if still saved, is preselected.
    pub fn new(connector: C, scheduler: S, store: St) -> Self {
        let settings = load_or_default(&store);
        let transport =
            TransportSession::new(connector, scheduler, ReconnectConfig::from_settings(&settings));
        let (selected, address) = settings
            .last_endpoint()
            .map_or((None, String::new()), |endpoint| {
                (Some(endpoint.id.clone()), endpoint.address.clone())
            });

        Self {
            transport,
            view: SessionView {
                log: MessageLog::new(LogConfig::from_settings(&settings)),
                settings,
                store,
                state: ViewState::default(),
                selected,
                address,
            },
            composer: ComposerHistory::new(),
            open: false,
        }
    }

    /// Run a host command.
    pub fn execute(&mut self, command: Command) {
        debug!(command = command.id(), "executing command");
        match command {
            Command::OpenView => self.open_view(),
            Command::Disconnect => self.disconnect(),
            Command::ClearLog => self.clear_log(),
        }
    }

    /// Show the session. Idempotent.
    pub fn open_view(&mut self) {
        if !self.open {
            info!("session view opened");
            self.open = true;
        }
        self.view.log.scroll_to_bottom();
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Tear the session down for good.
    pub fn shutdown(&mut self) {
        info!("session shutting down");
        self.transport.destroy(&mut self.view);
        self.open = false;
    }

    /// Feed a driver event to the transport.
    pub fn handle_event(&mut self, event: DriverEvent) {
        self.transport.handle_event(event, &mut self.view);
    }

    // ── Connection ──────────────────────────────────────────────────────

    /// The connect button: disconnects when connected or connecting,
    /// otherwise validates the address and connects.
    ///
    /// # Errors
    /// Returns a validation error, also logged as a notice, if the address
    /// is empty or not a `ws://`/`wss://` address. No connection is attempted.
    pub fn toggle_connection(&mut self) -> Result<(), ControllerError> {
        if self.view.state.is_busy() {
            self.disconnect();
            return Ok(());
        }
        self.connect()
    }

    /// Connect to the current address.
    ///
    /// # Errors
    /// See [`Self::toggle_connection`].
    pub fn connect(&mut self) -> Result<(), ControllerError> {
        if self.transport.is_destroyed() {
            debug!("connect ignored after shutdown");
            return Ok(());
        }
        let address = match validate_address(&self.view.address) {
            Ok(address) => address.to_string(),
            Err(e) => {
                self.view.notice(e.to_string(), NoticeKind::Error);
                return Err(e.into());
            }
        };

        // Leftovers from an errored connection must not look like a retry.
        self.transport.disconnect(&mut self.view);

        self.view.state = ViewState::with_status(ConnectionStatus::Connecting);
        self.view
            .notice(format!("Connecting to {address}..."), NoticeKind::Info);
        self.transport.connect(&address, &mut self.view);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect(&mut self.view);
    }

    /// Send a message and record it.
    ///
    /// # Errors
    /// Returns an error, also logged as a notice, if not connected or the
    /// write failed. A failed write leaves the connection state alone.
    pub fn send(&mut self, message: &str) -> Result<(), ControllerError> {
        if !self.transport.is_connected() {
            self.view.notice("Not connected", NoticeKind::Error);
            return Err(ControllerError::NotConnected);
        }
        if self.transport.send(message, &mut self.view) {
            self.view.log.add(SessionRecord::sent(message));
            Ok(())
        } else {
            Err(ControllerError::SendFailed)
        }
    }

    /// Send whatever is in the composer. A blank composer is a no-op.
    ///
    /// The message enters history even if sending fails.
    ///
    /// # Errors
    /// See [`Self::send`].
    pub fn submit_composer(&mut self) -> Result<(), ControllerError> {
        match self.composer.submit() {
            Some(message) => self.send(&message),
            None => Ok(()),
        }
    }

    pub fn clear_log(&mut self) {
        self.view.log.clear();
    }

    // ── Address and endpoints ───────────────────────────────────────────

    #[must_use]
    pub fn address(&self) -> &str {
        &self.view.address
    }

    /// Replace the typed address. Drops the endpoint selection if the address
    /// no longer matches it.
    pub fn set_address(&mut self, address: impl Into<String>) {
        self.view.address = address.into();
        let still_matches = self
            .selected_endpoint()
            .is_some_and(|endpoint| endpoint.address == self.view.address.trim());
        if !still_matches {
            self.view.selected = None;
        }
    }

    #[must_use]
    pub fn selected_endpoint(&self) -> Option<&Endpoint> {
        self.view
            .selected
            .as_deref()
            .and_then(|id| self.view.settings.endpoint(id))
    }

    /// Select a saved endpoint and fill in its address, or clear the
    /// selection with `None`.
    ///
    /// # Errors
    /// Returns an error while connected or connecting, or if the id is
    /// unknown.
    pub fn select_endpoint(&mut self, id: Option<&str>) -> Result<(), ControllerError> {
        if self.view.state.is_busy() {
            return Err(ControllerError::Busy);
        }
        let Some(id) = id else {
            self.view.selected = None;
            return Ok(());
        };
        let endpoint = self
            .view
            .settings
            .endpoint(id)
            .ok_or_else(|| ValidationError::UnknownEndpoint(id.to_string()))?;
        self.view.address.clone_from(&endpoint.address);
        self.view.selected = Some(endpoint.id.clone());
        Ok(())
    }

    /// Select the saved endpoint after the current one, wrapping around.
    ///
    /// Returns the selected endpoint, or `None` when nothing is saved.
    ///
    /// # Errors
    /// Returns an error while connected or connecting.
    pub fn select_next_endpoint(&mut self) -> Result<Option<&Endpoint>, ControllerError> {
        let saved = &self.view.settings.saved_connections;
        if saved.is_empty() {
            return Ok(None);
        }
        let next = self
            .view
            .selected
            .as_deref()
            .and_then(|id| saved.iter().position(|e| e.id == id))
            .map_or(0, |i| (i + 1) % saved.len());
        let id = saved[next].id.clone();
        self.select_endpoint(Some(&id))?;
        Ok(self.selected_endpoint())
    }

    /// Whether to offer saving the current address: connected to an
    /// address that is not saved yet.
    #[must_use]
    pub fn should_offer_save(&self) -> bool {
        self.view.state.status == ConnectionStatus::Connected
            && !self.view.settings.is_saved_address(self.view.address.trim())
    }

    /// Save the current address under `name`, select it and remember it as
    /// the last used endpoint.
    ///
    /// Returns the new endpoint id.
    ///
    /// # Errors
    /// Returns an error if the name or address is invalid, or the settings
    /// cannot be written.
    pub fn save_current_endpoint(&mut self, name: &str) -> Result<String, ControllerError> {
        let endpoint = Endpoint::new(name, &self.view.address)?;
        let name = endpoint.name.clone();

        let id = self.view.settings.add_endpoint(endpoint);
        self.view.settings.last_connection_id.clone_from(&id);
        self.view.selected = Some(id.clone());
        if self.view.state.status == ConnectionStatus::Connected {
            self.view.state.connection_name = Some(name.clone());
        }
        self.view.persist()?;

        info!(endpoint = %id, "endpoint saved");
        self.view
            .notice(format!("Connection \"{name}\" saved"), NoticeKind::Success);
        Ok(id)
    }

    /// Add a saved endpoint.
    ///
    /// # Errors
    /// Returns an error if the endpoint is invalid or cannot be stored.
    pub fn add_endpoint(&mut self, name: &str, address: &str) -> Result<String, ControllerError> {
        let endpoint = Endpoint::new(name, address)?;
        let mut id = String::new();
        self.update_settings(|settings| {
            id = settings.add_endpoint(endpoint);
            Ok(())
        })?;
        Ok(id)
    }

    /// Rename or re-address a saved endpoint.
    ///
    /// # Errors
    /// Returns an error if the id is unknown, the values are invalid, or the
    /// settings cannot be stored.
    pub fn update_endpoint(
        &mut self,
        id: &str,
        name: &str,
        address: &str,
    ) -> Result<(), ControllerError> {
        self.update_settings(|settings| settings.update_endpoint(id, name, address))
    }

    /// Delete a saved endpoint.
    ///
    /// # Errors
    /// Returns an error if the id is unknown or the settings cannot be stored.
    pub fn remove_endpoint(&mut self, id: &str) -> Result<Endpoint, ControllerError> {
        let mut removed = None;
        self.update_settings(|settings| {
            removed = settings.remove_endpoint(id);
            removed
                .as_ref()
                .map(|_| ())
                .ok_or_else(|| ValidationError::UnknownEndpoint(id.to_string()))
        })?;
        removed.ok_or_else(|| ValidationError::UnknownEndpoint(id.to_string()).into())
    }

    // ── Settings ────────────────────────────────────────────────────────

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.view.settings
    }

    /// Edit the settings, then validate, store and apply them.
    ///
    /// Nothing changes if `edit` or validation fails.
    ///
    /// # Errors
    /// Returns the edit or validation error, or a storage error. A storage
    /// error leaves the new settings applied in memory.
    pub fn update_settings<F>(&mut self, edit: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ValidationError>,
    {
        let mut settings = self.view.settings.clone();
        edit(&mut settings)?;
        settings.validate()?;

        self.view.settings = settings;
        self.refresh_settings();
        self.view.persist()?;
        Ok(())
    }

    /// Push the current settings into the log and the transport.
    pub fn refresh_settings(&mut self) {
        let settings = &self.view.settings;
        self.view.log.update_config(LogConfig::from_settings(settings));
        self.transport
            .update_config(ReconnectConfig::from_settings(settings));

        let selection_gone = self
            .view
            .selected
            .as_deref()
            .is_some_and(|id| settings.endpoint(id).is_none());
        if selection_gone {
            self.view.selected = None;
        }
        debug!("settings applied");
    }

    // ── Presentation ────────────────────────────────────────────────────

    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.view.state.status
    }

    #[must_use]
    pub const fn state(&self) -> &ViewState {
        &self.view.state
    }

    /// One-line status, e.g. `Connected to Echo`.
    #[must_use]
    pub fn status_text(&self) -> String {
        let state = &self.view.state;
        status_text(
            state.status,
            state.connection_name.as_deref(),
            state.error.as_deref(),
        )
    }

    /// Compact status for a status bar, e.g. `WS: Connected`.
    #[must_use]
    pub const fn status_bar_text(&self) -> &'static str {
        status_bar_text(self.view.state.status)
    }

    /// Label for the connect button.
    #[must_use]
    pub const fn connect_label(&self) -> &'static str {
        match self.view.state.status {
            ConnectionStatus::Connecting => "Cancel",
            ConnectionStatus::Connected => "Disconnect",
            ConnectionStatus::Disconnected | ConnectionStatus::Error => "Connect",
        }
    }

    /// The address and endpoint selection are locked while busy.
    #[must_use]
    pub const fn address_editable(&self) -> bool {
        !self.view.state.is_busy()
    }

    #[must_use]
    pub fn message_count_text(&self) -> String {
        self.view.log.message_count_text()
    }

    #[must_use]
    pub const fn log(&self) -> &MessageLog {
        &self.view.log
    }

    pub const fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.view.log
    }

    #[must_use]
    pub const fn composer(&self) -> &ComposerHistory {
        &self.composer
    }

    pub const fn composer_mut(&mut self) -> &mut ComposerHistory {
        &mut self.composer
    }

    #[must_use]
    pub const fn transport(&self) -> &TransportSession<C, S> {
        &self.transport
    }

    #[must_use]
    pub const fn store(&self) -> &St {
        &self.view.store
    }
}
