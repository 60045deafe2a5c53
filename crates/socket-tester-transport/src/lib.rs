//! Transport layer for the socket tester.
//!
//! Provides:
//! - `TransportSession` - Connection lifecycle and reconnection state machine
//! - Transport and timer seams (`Connector`, `Connection`, `Scheduler`)
//! - WebSocket driver and tokio scheduler (feature: websocket)
//! - Composer key mapping (feature: tui)

pub mod backoff;
pub mod protocol;
pub mod session;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use backoff::{ReconnectConfig, reconnect_delay};
pub use protocol::{
    Connection, ConnectionId, Connector, DriverEvent, ReadyState, Scheduler, TimerHandle,
    TransportError, TransportEvent,
};
pub use session::TransportSession;

#[cfg(feature = "websocket")]
pub use websocket::{TokioScheduler, WsConnection, WsConnector};
