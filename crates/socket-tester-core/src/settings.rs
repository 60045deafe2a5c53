//! Persisted configuration document.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Address schemes accepted for a connection.
pub const ACCEPTED_SCHEMES: [&str; 2] = ["ws://", "wss://"];

/// Local validation failure. Nothing is sent or stored when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a WebSocket URL")]
    EmptyAddress,
    #[error("URL must start with ws:// or wss://")]
    UnsupportedScheme(String),
    #[error("Connection name is required")]
    EmptyName,
    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },
    #[error("Unknown connection: {0}")]
    UnknownEndpoint(String),
}

/// Check that `address` uses one of the accepted schemes.
///
/// Returns the trimmed address on success.
///
/// # Errors
/// Returns [`ValidationError::EmptyAddress`] for blank input and
/// [`ValidationError::UnsupportedScheme`] for any other scheme.
pub fn validate_address(address: &str) -> Result<&str, ValidationError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    if ACCEPTED_SCHEMES.iter().any(|scheme| address.starts_with(scheme)) {
        Ok(address)
    } else {
        Err(ValidationError::UnsupportedScheme(address.to_string()))
    }
}

/// A named, saved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Opaque unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `ws://` or `wss://` address.
    #[serde(rename = "url")]
    pub address: String,
}

impl Endpoint {
    /// Create an endpoint with a freshly generated id.
    ///
    /// # Errors
    /// Returns an error if the name is blank or the address is invalid.
    pub fn new(name: &str, address: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let address = validate_address(address)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            address: address.to_string(),
        })
    }
}

/// Clock style used when rendering record timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimestampFormat {
    /// `chrono` format string for this style.
    #[must_use]
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::TwelveHour => "%I:%M:%S %p",
            Self::TwentyFourHour => "%H:%M:%S",
        }
    }
}

/// Settings document. Missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub saved_connections: Vec<Endpoint>,
    /// Id of the endpoint last connected to, empty when none.
    pub last_connection_id: String,
    pub auto_reconnect: bool,
    /// Base reconnect delay in milliseconds.
    pub reconnect_delay: u64,
    pub max_reconnect_attempts: u32,
    pub font_family: String,
    pub font_size: u32,
    pub max_messages: usize,
    pub show_timestamps: bool,
    pub timestamp_format: TimestampFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            saved_connections: Vec::new(),
            last_connection_id: String::new(),
            auto_reconnect: false,
            reconnect_delay: 1000,
            max_reconnect_attempts: 3,
            font_family: "monospace".to_string(),
            font_size: 13,
            max_messages: 500,
            show_timestamps: true,
            timestamp_format: TimestampFormat::TwentyFourHour,
        }
    }
}

fn positive<T: Default + PartialOrd>(value: T, field: &'static str) -> Result<T, ValidationError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ValidationError::NotPositive { field })
    }
}

impl Settings {
    /// Check the numeric fields are positive.
    ///
    /// # Errors
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        positive(self.reconnect_delay, "reconnectDelay")?;
        positive(self.max_reconnect_attempts, "maxReconnectAttempts")?;
        positive(self.font_size, "fontSize")?;
        positive(self.max_messages, "maxMessages")?;
        Ok(())
    }

    /// # Errors
    /// Rejects zero.
    pub fn set_reconnect_delay(&mut self, millis: u64) -> Result<(), ValidationError> {
        self.reconnect_delay = positive(millis, "reconnectDelay")?;
        Ok(())
    }

    /// # Errors
    /// Rejects zero.
    pub fn set_max_reconnect_attempts(&mut self, attempts: u32) -> Result<(), ValidationError> {
        self.max_reconnect_attempts = positive(attempts, "maxReconnectAttempts")?;
        Ok(())
    }

    /// # Errors
    /// Rejects zero.
    pub fn set_font_size(&mut self, size: u32) -> Result<(), ValidationError> {
        self.font_size = positive(size, "fontSize")?;
        Ok(())
    }

    /// # Errors
    /// Rejects zero.
    pub fn set_max_messages(&mut self, max: usize) -> Result<(), ValidationError> {
        self.max_messages = positive(max, "maxMessages")?;
        Ok(())
    }

    /// Blank input resets the family to `monospace`.
    pub fn set_font_family(&mut self, family: &str) {
        let family = family.trim();
        self.font_family = if family.is_empty() {
            "monospace".to_string()
        } else {
            family.to_string()
        };
    }

    /// Look up a saved endpoint by id.
    #[must_use]
    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.saved_connections.iter().find(|c| c.id == id)
    }

    /// Name of the first saved endpoint with this address.
    #[must_use]
    pub fn endpoint_name_for(&self, address: &str) -> Option<&str> {
        self.saved_connections
            .iter()
            .find(|c| c.address == address)
            .map(|c| c.name.as_str())
    }

    /// Whether any saved endpoint uses this address.
    #[must_use]
    pub fn is_saved_address(&self, address: &str) -> bool {
        self.saved_connections.iter().any(|c| c.address == address)
    }

    /// The endpoint recorded as last used, if it still exists.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<&Endpoint> {
        if self.last_connection_id.is_empty() {
            return None;
        }
        self.endpoint(&self.last_connection_id)
    }

    /// Append a saved endpoint and return its id.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> String {
        let id = endpoint.id.clone();
        self.saved_connections.push(endpoint);
        id
    }

    /// Rename or re-address a saved endpoint.
    ///
    /// # Errors
    /// Returns an error if the id is unknown or the new values are invalid.
    pub fn update_endpoint(
        &mut self,
        id: &str,
        name: &str,
        address: &str,
    ) -> Result<(), ValidationError> {
        let validated = Endpoint::new(name, address)?;
        let endpoint = self
            .saved_connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ValidationError::UnknownEndpoint(id.to_string()))?;
        endpoint.name = validated.name;
        endpoint.address = validated.address;
        Ok(())
    }

    /// Remove a saved endpoint. Clears `last_connection_id` if it pointed at it.
    ///
    /// Returns the removed endpoint.
    pub fn remove_endpoint(&mut self, id: &str) -> Option<Endpoint> {
        let index = self.saved_connections.iter().position(|c| c.id == id)?;
        if self.last_connection_id == id {
            self.last_connection_id.clear();
        }
        Some(self.saved_connections.remove(index))
    }
}
