//! Transport session: one connection at a time plus the reconnect loop.
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──Opened──▶ Connected
//!       ▲                        │    ▲                 │
//!       │                      Error  └──timer (retry)──┤ Closed, not manual,
//!       │                        ▼                      │ auto_reconnect
//!       └──────disconnect()── Error ◀───────────────────┘
//! ```
//!
//! The session is a plain state machine. It never blocks and never spawns:
//! network activity goes through a [`Connector`], deferred reconnects
//! through a [`Scheduler`], and everything that happens afterwards comes
//! back in through [`TransportSession::handle_event`].

use socket_tester_core::{ConnectionObserver, ConnectionStatus};
use tracing::{debug, info, warn};

use crate::{
    backoff::{ReconnectConfig, reconnect_delay},
    protocol::{
        CLOSE_NORMAL, Connection, ConnectionId, Connector, DriverEvent, Scheduler, TimerHandle,
        TransportEvent, USER_DISCONNECT_REASON,
    },
};

struct Active<T> {
    id: ConnectionId,
    connection: T,
    /// Saw `Opened` at least once.
    opened: bool,
}

#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    timer: Option<TimerHandle>,
    manual_disconnect: bool,
}

/// Owns at most one live connection and its retry behavior.
pub struct TransportSession<C: Connector, S: Scheduler> {
    connector: C,
    scheduler: S,
    config: ReconnectConfig,
    status: ConnectionStatus,
    address: String,
    active: Option<Active<C::Connection>>,
    retry: RetryState,
    next_id: u64,
    destroyed: bool,
}

impl<C: Connector, S: Scheduler> TransportSession<C, S> {
    /// Create a disconnected session.
    #[must_use]
    pub fn new(connector: C, scheduler: S, config: ReconnectConfig) -> Self {
        Self {
            connector,
            scheduler,
            config,
            status: ConnectionStatus::Disconnected,
            address: String::new(),
            active: None,
            retry: RetryState::default(),
            next_id: 0,
            destroyed: false,
        }
    }

    /// Connect to `address`, tearing down any current or pending connection.
    ///
    /// Construction failures set the status to `Error` and are reported
    /// through `observer`; they never start the reconnect loop.
    pub fn connect<O>(&mut self, address: &str, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        if self.destroyed {
            debug!("connect ignored: session destroyed");
            return;
        }
        if self.active.is_some() || self.retry.timer.is_some() {
            self.disconnect(observer);
        }
        self.retry = RetryState::default();
        info!(%address, "connecting");
        self.open(address, observer);
    }

    fn open<O>(&mut self, address: &str, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        address.clone_into(&mut self.address);
        self.retry.manual_disconnect = false;
        self.set_status(ConnectionStatus::Connecting, observer);

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        match self.connector.open(id, address) {
            Ok(connection) => {
                debug!(%id, "transport created");
                self.active = Some(Active {
                    id,
                    connection,
                    opened: false,
                });
            }
            Err(err) => {
                warn!(%address, "failed to create transport: {err}");
                self.set_status(ConnectionStatus::Error, observer);
                observer.on_error(&format!("Failed to create WebSocket: {err}"));
            }
        }
    }

    /// Close the connection and stop any reconnect in progress. Idempotent.
    pub fn disconnect<O>(&mut self, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        self.retry.manual_disconnect = true;
        self.cancel_timer();

        if let Some(mut active) = self.active.take() {
            info!(id = %active.id, "disconnecting");
            active
                .connection
                .close(CLOSE_NORMAL, USER_DISCONNECT_REASON);
            // Later events from this connection are discarded as stale, so
            // report the close now.
            if active.opened {
                observer.on_close(CLOSE_NORMAL, USER_DISCONNECT_REASON);
            }
        }

        self.set_status(ConnectionStatus::Disconnected, observer);
    }

    /// Write a text frame.
    ///
    /// Returns `false` without side effects unless connected. A failed write
    /// is reported through `observer` but leaves the status unchanged; the
    /// transport's own close/error events decide liveness.
    pub fn send<O>(&mut self, text: &str, observer: &mut O) -> bool
    where
        O: ConnectionObserver + ?Sized,
    {
        if self.status != ConnectionStatus::Connected {
            return false;
        }
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if !active.connection.is_open() {
            return false;
        }
        match active.connection.send(text) {
            Ok(()) => true,
            Err(err) => {
                warn!(id = %active.id, "send failed: {err}");
                observer.on_send_error(&format!("Failed to send message: {err}"));
                false
            }
        }
    }

    /// Connected according to both the state machine and the transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
            && self
                .active
                .as_ref()
                .is_some_and(|active| active.connection.is_open())
    }

    /// Disconnect and make the session permanently inert.
    pub fn destroy<O>(&mut self, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        self.disconnect(observer);
        self.cancel_timer();
        self.destroyed = true;
    }

    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Address of the current or most recent connection.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reconnect attempts made since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retry.attempts
    }

    /// Whether a reconnect is scheduled.
    #[must_use]
    pub const fn reconnect_pending(&self) -> bool {
        self.retry.timer.is_some()
    }

    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Apply new reconnect settings. Takes effect at the next close.
    pub fn update_config(&mut self, config: ReconnectConfig) {
        self.config = config;
    }

    /// Feed a transport or timer event into the state machine.
    pub fn handle_event<O>(&mut self, event: DriverEvent, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        if self.destroyed {
            return;
        }
        match event {
            DriverEvent::Transport { connection, event } => {
                self.handle_transport_event(connection, event, observer);
            }
            DriverEvent::Timer(handle) => self.handle_timer(handle, observer),
        }
    }

    fn handle_transport_event<O>(&mut self, id: ConnectionId, event: TransportEvent, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        if self.active.as_ref().map(|active| active.id) != Some(id) {
            debug!(%id, ?event, "discarding event from stale connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if let Some(active) = self.active.as_mut() {
                    active.opened = true;
                }
                self.retry.attempts = 0;
                self.set_status(ConnectionStatus::Connected, observer);
                observer.on_open();
            }
            TransportEvent::Message(text) => observer.on_message(&text),
            TransportEvent::Error(description) => {
                warn!(%id, "transport error: {description}");
                self.set_status(ConnectionStatus::Error, observer);
                observer.on_error(&description);
            }
            TransportEvent::SendFailed(description) => {
                warn!(%id, "write failed: {description}");
                observer.on_send_error(&format!("Failed to send message: {description}"));
            }
            TransportEvent::Closed { code, reason } => {
                let was_open = self.active.take().is_some_and(|active| active.opened);
                info!(%id, code, %reason, "connection closed");
                self.set_status(ConnectionStatus::Disconnected, observer);
                observer.on_close(code, &reason);

                if self.should_reconnect(was_open) {
                    self.attempt_reconnect(observer);
                }
            }
        }
    }

    /// A close triggers a retry when it was not requested, reconnecting is
    /// enabled, and the connection had opened or a retry cycle is running.
    const fn should_reconnect(&self, was_open: bool) -> bool {
        !self.retry.manual_disconnect
            && self.config.auto_reconnect
            && (was_open || self.retry.attempts > 0)
    }

    fn attempt_reconnect<O>(&mut self, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        self.retry.attempts += 1;
        if self.retry.attempts > self.config.max_attempts {
            warn!(
                "exceeded {} reconnection attempts, giving up",
                self.config.max_attempts
            );
            observer.on_error(&format!(
                "Failed to reconnect after {} attempts",
                self.config.max_attempts
            ));
            return;
        }

        let delay = reconnect_delay(self.config.base_delay, self.retry.attempts);
        info!(
            "connection lost, retrying in {:?} (attempt {}/{})",
            delay, self.retry.attempts, self.config.max_attempts
        );
        self.retry.timer = Some(self.scheduler.schedule(delay));
        self.set_status(ConnectionStatus::Connecting, observer);
    }

    fn handle_timer<O>(&mut self, handle: TimerHandle, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        if self.retry.timer != Some(handle) {
            debug!(?handle, "ignoring stale timer");
            return;
        }
        self.retry.timer = None;
        self.scheduler.cancel(handle);

        // A disconnect may have raced the timer.
        if self.retry.manual_disconnect {
            return;
        }
        let address = self.address.clone();
        self.open(&address, observer);
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.retry.timer.take() {
            debug!(?handle, "cancelling reconnect timer");
            self.scheduler.cancel(handle);
        }
    }

    fn set_status<O>(&mut self, status: ConnectionStatus, observer: &mut O)
    where
        O: ConnectionObserver + ?Sized,
    {
        debug!(from = ?self.status, to = ?status, "status change");
        self.status = status;
        observer.on_status_change(status);
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::test_utils::*;
    use super::*;
    use crate::protocol::{CLOSE_ABNORMAL, ReadyState};

    struct Harness {
        session: TransportSession<MockConnector, MockScheduler>,
        connector: MockConnector,
        scheduler: MockScheduler,
        seen: Recorder,
    }

    impl Harness {
        fn new(config: ReconnectConfig) -> Self {
            let connector = MockConnector::default();
            let scheduler = MockScheduler::default();
            Self {
                session: TransportSession::new(connector.clone(), scheduler.clone(), config),
                connector,
                scheduler,
                seen: Recorder::default(),
            }
        }

        fn reconnecting(max_attempts: u32) -> Self {
            Self::new(ReconnectConfig {
                auto_reconnect: true,
                base_delay: Duration::from_millis(100),
                max_attempts,
            })
        }

        fn event(&mut self, event: TransportEvent) {
            let id = self.connector.0.borrow().last_id();
            self.event_for(id, event);
        }

        fn event_for(&mut self, id: ConnectionId, event: TransportEvent) {
            self.session.handle_event(
                DriverEvent::Transport {
                    connection: id,
                    event,
                },
                &mut self.seen,
            );
        }

        /// Remote side accepts the most recent connection.
        fn accept(&mut self) {
            let id = self.connector.0.borrow().last_id();
            self.connector
                .0
                .borrow_mut()
                .states
                .insert(id, ReadyState::Open);
            self.event(TransportEvent::Opened);
        }

        /// Remote side drops the most recent connection.
        fn drop_remote(&mut self) {
            let id = self.connector.0.borrow().last_id();
            self.connector
                .0
                .borrow_mut()
                .states
                .insert(id, ReadyState::Closed);
            self.event(TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            });
        }

        fn fire_timer(&mut self) {
            let handle = self.scheduler.0.borrow().last_handle();
            self.session
                .handle_event(DriverEvent::Timer(handle), &mut self.seen);
        }

        fn open_count(&self) -> usize {
            self.connector.0.borrow().opened.len()
        }
    }

    #[test]
    fn test_connect_then_open() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://x", &mut h.seen);
        assert_eq!(h.session.status(), ConnectionStatus::Connecting);
        assert_eq!(h.open_count(), 1);
        assert!(!h.session.is_connected());

        h.accept();
        assert_eq!(h.session.status(), ConnectionStatus::Connected);
        assert!(h.session.is_connected());
        assert_eq!(
            h.seen.0,
            vec![
                Seen::Status(ConnectionStatus::Connecting),
                Seen::Status(ConnectionStatus::Connected),
                Seen::Open,
            ]
        );
    }

    #[test]
    fn test_construction_failure_is_terminal() {
        let mut h = Harness::reconnecting(3);
        h.connector.0.borrow_mut().fail_open = Some("bad host".to_string());
        h.session.connect("wss://", &mut h.seen);

        assert_eq!(h.session.status(), ConnectionStatus::Error);
        assert_eq!(h.seen.errors().len(), 1);
        assert!(h.seen.errors()[0].starts_with("Failed to create WebSocket:"));
        assert!(h.scheduler.0.borrow().scheduled.is_empty());
        assert!(!h.session.reconnect_pending());
    }

    #[test]
    fn test_send_requires_connected() {
        let mut h = Harness::new(ReconnectConfig::default());
        assert!(!h.session.send("early", &mut h.seen));

        h.session.connect("ws://x", &mut h.seen);
        assert!(!h.session.send("still connecting", &mut h.seen));
        assert!(h.connector.0.borrow().sent.is_empty());

        h.accept();
        assert!(h.session.send("hello", &mut h.seen));
        assert_eq!(h.connector.0.borrow().sent, vec!["hello"]);
        assert!(h.seen.errors().is_empty());
    }

    #[test]
    fn test_send_failure_reports_without_status_change() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.connector.0.borrow_mut().fail_send = true;

        assert!(!h.session.send("lost", &mut h.seen));
        assert_eq!(h.session.status(), ConnectionStatus::Connected);
        assert_eq!(h.seen.send_errors().len(), 1);
        assert!(h.seen.send_errors()[0].starts_with("Failed to send message:"));

        h.event(TransportEvent::SendFailed("broken pipe".to_string()));
        assert_eq!(h.session.status(), ConnectionStatus::Connected);
        assert_eq!(h.seen.send_errors()[1], "Failed to send message: broken pipe");
        assert!(h.seen.errors().is_empty());
    }

    #[test]
    fn test_is_connected_checks_transport_state() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        let id = h.connector.0.borrow().last_id();
        h.connector
            .0
            .borrow_mut()
            .states
            .insert(id, ReadyState::Closing);

        assert_eq!(h.session.status(), ConnectionStatus::Connected);
        assert!(!h.session.is_connected());
        assert!(!h.session.send("x", &mut h.seen));
    }

    #[test]
    fn test_disconnect_closes_normally_and_is_idempotent() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.session.disconnect(&mut h.seen);

        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
        let closed = h.connector.0.borrow().closed.clone();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].1, CLOSE_NORMAL);
        assert_eq!(closed[0].2, USER_DISCONNECT_REASON);
        assert!(
            h.seen
                .0
                .contains(&Seen::Close(CLOSE_NORMAL, USER_DISCONNECT_REASON.to_string()))
        );

        h.session.disconnect(&mut h.seen);
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
        assert_eq!(h.connector.0.borrow().closed.len(), 1);

        // The driver's own close report arrives late and is ignored.
        h.event(TransportEvent::Closed {
            code: CLOSE_NORMAL,
            reason: String::new(),
        });
        assert!(h.scheduler.0.borrow().scheduled.is_empty());
    }

    #[test]
    fn test_backoff_sequence_and_single_exhaustion_error() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();

        for _ in 0..3 {
            assert_eq!(h.session.status(), ConnectionStatus::Connecting);
            assert!(h.session.reconnect_pending());
            h.fire_timer();
            // The attempt fails before opening.
            h.event(TransportEvent::Error("refused".to_string()));
            h.drop_remote();
        }

        assert_eq!(
            h.scheduler.0.borrow().delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
        assert_eq!(h.open_count(), 4);
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
        assert!(!h.session.reconnect_pending());

        let exhausted: Vec<_> = h
            .seen
            .errors()
            .into_iter()
            .filter(|e| e.starts_with("Failed to reconnect"))
            .collect();
        assert_eq!(exhausted, vec!["Failed to reconnect after 3 attempts"]);
    }

    #[test]
    fn test_reconnect_broadcasts_connecting_before_delay() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.seen.0.clear();
        h.drop_remote();

        assert_eq!(
            h.seen.0,
            vec![
                Seen::Status(ConnectionStatus::Disconnected),
                Seen::Close(CLOSE_ABNORMAL, String::new()),
                Seen::Status(ConnectionStatus::Connecting),
            ]
        );
        assert_eq!(h.open_count(), 1);
    }

    #[test]
    fn test_disconnect_during_wait_cancels_reconnect() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();
        let handle = h.scheduler.0.borrow().last_handle();

        h.session.disconnect(&mut h.seen);
        assert!(h.scheduler.0.borrow().cancelled.contains(&handle));

        // The expiry was already queued when the cancel happened.
        h.fire_timer();
        assert_eq!(h.open_count(), 1);
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_successful_reconnect_resets_attempts() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();
        h.fire_timer();
        assert_eq!(h.session.attempts(), 1);
        assert_eq!(h.connector.0.borrow().opened[1].1, "ws://x");

        h.accept();
        assert_eq!(h.session.attempts(), 0);
        h.drop_remote();
        assert_eq!(
            h.scheduler.0.borrow().delays(),
            vec![Duration::from_millis(100), Duration::from_millis(100)]
        );
    }

    #[test]
    fn test_manual_connect_resets_attempts() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();
        h.fire_timer();
        h.drop_remote();
        assert_eq!(h.session.attempts(), 2);

        h.session.connect("ws://y", &mut h.seen);
        assert_eq!(h.session.attempts(), 0);
        assert!(!h.session.reconnect_pending());
        assert_eq!(h.session.address(), "ws://y");
    }

    #[test]
    fn test_no_reconnect_when_disabled() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
        assert!(h.scheduler.0.borrow().scheduled.is_empty());
    }

    #[test]
    fn test_failed_first_connect_does_not_retry() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.event(TransportEvent::Error("refused".to_string()));
        assert_eq!(h.session.status(), ConnectionStatus::Error);
        h.drop_remote();
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
        assert!(h.scheduler.0.borrow().scheduled.is_empty());
    }

    #[test]
    fn test_error_then_close_on_open_connection_reconnects() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.event(TransportEvent::Error("reset".to_string()));
        assert_eq!(h.session.status(), ConnectionStatus::Error);
        assert!(!h.session.reconnect_pending());

        h.drop_remote();
        assert!(h.session.reconnect_pending());
    }

    #[test]
    fn test_reconnect_replaces_previous_connection() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://a", &mut h.seen);
        h.accept();
        let first = h.connector.0.borrow().last_id();

        h.session.connect("ws://b", &mut h.seen);
        assert_eq!(h.connector.0.borrow().closed[0].0, first);

        // Late traffic from the first connection is ignored.
        h.event_for(first, TransportEvent::Message("late".to_string()));
        h.event_for(
            first,
            TransportEvent::Closed {
                code: CLOSE_NORMAL,
                reason: String::new(),
            },
        );
        assert!(!h.seen.0.contains(&Seen::Message("late".to_string())));
        assert_eq!(h.session.status(), ConnectionStatus::Connecting);

        h.accept();
        h.event(TransportEvent::Message("fresh".to_string()));
        assert!(h.seen.0.contains(&Seen::Message("fresh".to_string())));
    }

    #[test]
    fn test_destroy_is_terminal() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.session.destroy(&mut h.seen);
        assert!(h.session.is_destroyed());
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);

        h.session.connect("ws://x", &mut h.seen);
        assert_eq!(h.open_count(), 1);
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_destroy_during_wait_cancels_reconnect() {
        let mut h = Harness::reconnecting(3);
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.drop_remote();
        assert!(h.session.reconnect_pending());
        let handle = h.scheduler.0.borrow().last_handle();

        h.session.destroy(&mut h.seen);
        assert!(h.scheduler.0.borrow().cancelled.contains(&handle));
        assert!(!h.session.reconnect_pending());

        h.fire_timer();
        assert_eq!(h.open_count(), 1);
        assert_eq!(h.session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_update_config_applies_to_next_close() {
        let mut h = Harness::new(ReconnectConfig::default());
        h.session.connect("ws://x", &mut h.seen);
        h.accept();
        h.session.update_config(ReconnectConfig {
            auto_reconnect: true,
            base_delay: Duration::from_millis(5),
            max_attempts: 1,
        });
        h.drop_remote();
        assert_eq!(
            h.scheduler.0.borrow().delays(),
            vec![Duration::from_millis(5)]
        );
    }
}
