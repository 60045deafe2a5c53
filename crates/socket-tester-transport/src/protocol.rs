//! Transport events and the seams between the session and the network.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// No status code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Reason sent with a user-initiated close.
pub const USER_DISCONNECT_REASON: &str = "User disconnected";

/// Identifies one underlying connection opened by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Notification from an underlying connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Opened,
    /// Text frame received.
    Message(String),
    /// Protocol or network error. Closure, if any, follows as `Closed`.
    Error(String),
    /// A queued write failed. Does not imply the connection is gone.
    SendFailed(String),
    /// Connection closed.
    Closed { code: u16, reason: String },
}

/// Everything the session's event loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Transport {
        connection: ConnectionId,
        event: TransportEvent,
    },
    Timer(TimerHandle),
}

/// Ready state reported by a connection, as in the browser WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("connection is not open")]
    NotOpen,
    #[error("connection task has exited")]
    ChannelClosed,
}

/// Opens connections. Opening is synchronous; the handshake result arrives
/// later as a [`TransportEvent`] tagged with `id`.
pub trait Connector {
    type Connection: Connection;

    /// Start connecting to `address`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be constructed at all
    /// (for example an unparsable address). No events follow in that case.
    fn open(&mut self, id: ConnectionId, address: &str) -> Result<Self::Connection, TransportError>;
}

/// A live (or pending) connection.
pub trait Connection {
    /// Queue a text frame.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be queued.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Start closing with a close code and reason. Idempotent.
    fn close(&mut self, code: u16, reason: &str);

    fn ready_state(&self) -> ReadyState;

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Cancellable deferred tasks. Expiry is delivered as
/// [`DriverEvent::Timer`] with the returned handle.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration) -> TimerHandle;

    /// Cancel a pending timer. Unknown or fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);
}
