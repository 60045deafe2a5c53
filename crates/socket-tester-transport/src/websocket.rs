//! WebSocket driver built on tokio-tungstenite.
//!
//! Each connection runs in its own task and reports back through a shared
//! [`DriverEvent`] channel, tagged with the [`ConnectionId`] the session
//! assigned. Dropping a [`WsConnection`] closes the command channel, which
//! makes the task send a normal close frame and exit.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, Connection, ConnectionId, Connector,
    DriverEvent, ReadyState, Scheduler, TimerHandle, TransportError, TransportEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to acknowledge a close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Opens WebSocket connections as background tasks.
#[derive(Debug, Clone)]
pub struct WsConnector {
    events: mpsc::UnboundedSender<DriverEvent>,
}

impl WsConnector {
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self { events }
    }
}

impl Connector for WsConnector {
    type Connection = WsConnection;

    fn open(&mut self, id: ConnectionId, address: &str) -> Result<WsConnection, TransportError> {
        let url = parse_address(address)?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        tokio::spawn(run_connection(
            url.into(),
            command_rx,
            Emitter {
                id,
                events: self.events.clone(),
            },
            Arc::clone(&state),
        ));

        Ok(WsConnection {
            id,
            commands,
            state,
        })
    }
}

fn parse_address(address: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Handle to a connection task.
#[derive(Debug)]
pub struct WsConnection {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Outbound>,
    state: Arc<AtomicU8>,
}

impl WsConnection {
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text({} bytes)", text.len()),
            Self::Close { code, .. } => write!(f, "Close({code})"),
        }
    }
}

impl Connection for WsConnection {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        self.commands
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.state
            .store(ReadyState::Closing as u8, Ordering::SeqCst);
        let _ = self.commands.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

struct Emitter {
    id: ConnectionId,
    events: mpsc::UnboundedSender<DriverEvent>,
}

impl Emitter {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(DriverEvent::Transport {
            connection: self.id,
            event,
        });
    }

    fn fail(&self, description: String) {
        self.emit(TransportEvent::Error(description));
        self.emit(TransportEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        });
    }
}

async fn run_connection(
    address: String,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    emitter: Emitter,
    state: Arc<AtomicU8>,
) {
    let id = emitter.id;
    let set_state = |s: ReadyState| state.store(s as u8, Ordering::SeqCst);

    let ws = tokio::select! {
        result = connect_async(address.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(err) => {
                warn!(%id, %address, "handshake failed: {err}");
                set_state(ReadyState::Closed);
                emitter.fail(format!("WebSocket connection error: {err}"));
                return;
            }
        },
        // Only a close (or a dropped handle) can arrive before the handshake.
        _ = commands.recv() => {
            debug!(%id, "closed before handshake completed");
            set_state(ReadyState::Closed);
            return;
        }
    };

    set_state(ReadyState::Open);
    info!(%id, %address, "connected");
    emitter.emit(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    let (code, reason) = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emitter.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(%id, len = data.len(), "ignoring binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%id, ?frame, "received close frame");
                    break frame.map_or_else(
                        || (CLOSE_NO_STATUS, String::new()),
                        |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                    );
                }
                // Ping/Pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(%id, "read error: {err}");
                    emitter.emit(TransportEvent::Error(format!(
                        "WebSocket connection error: {err}"
                    )));
                    break (CLOSE_ABNORMAL, String::new());
                }
                None => break (CLOSE_ABNORMAL, String::new()),
            },

            command = commands.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        warn!(%id, "write error: {err}");
                        emitter.emit(TransportEvent::SendFailed(err.to_string()));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    close_gracefully(&mut sink, &mut stream, code, &reason).await;
                    break (code, reason);
                }
                None => {
                    debug!(%id, "handle dropped, closing");
                    close_gracefully(&mut sink, &mut stream, CLOSE_NORMAL, "").await;
                    break (CLOSE_NORMAL, String::new());
                }
            },
        }
    };

    // Flushes a pending close reply, if any.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;

    set_state(ReadyState::Closed);
    info!(%id, code, %reason, "disconnected");
    emitter.emit(TransportEvent::Closed { code, reason });
}

async fn close_gracefully(
    sink: &mut SplitSink<WsStream, Message>,
    stream: &mut SplitStream<WsStream>,
    code: u16,
    reason: &str,
) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    };
    if let Err(err) = sink.send(Message::Close(Some(frame))).await {
        debug!("failed to send close frame: {err}");
        return;
    }

    let acknowledged = async {
        while let Some(Ok(frame)) = stream.next().await {
            if frame.is_close() {
                break;
            }
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, acknowledged).await.is_err() {
        debug!("peer did not acknowledge close");
    }
}

/// [`Scheduler`] backed by tokio timers. Expiry is posted to the same
/// channel the connections use.
#[derive(Debug)]
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<DriverEvent>,
    timers: HashMap<TimerHandle, JoinHandle<()>>,
    next: u64,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self {
            events,
            timers: HashMap::new(),
            next: 0,
        }
    }

    /// Number of timers that have not fired or been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        self.timers.retain(|_, task| !task.is_finished());

        self.next += 1;
        let handle = TimerHandle(self.next);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DriverEvent::Timer(handle));
        });
        self.timers.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.timers.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<DriverEvent>) -> TransportEvent {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed");
        match event {
            DriverEvent::Transport { event, .. } => event,
            DriverEvent::Timer(handle) => panic!("unexpected timer {handle:?}"),
        }
    }

    /// Accepts one client and echoes its text frames. Closes with
    /// `close_with` after the first echo when given.
    async fn echo_server(close_with: Option<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                    if let Some((code, reason)) = close_with {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.to_string().into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                    }
                }
            }
        });
        format!("ws://{addr}")
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("ws://localhost:8080/path").is_ok());
        assert!(parse_address("wss://echo.example.com").is_ok());
        assert!(matches!(
            parse_address("http://localhost"),
            Err(TransportError::InvalidAddress { .. })
        ));
        assert!(parse_address("ws://").is_err());
        assert!(parse_address("not a url").is_err());
    }

    #[tokio::test]
    async fn test_open_echo_and_close() {
        let address = echo_server(None).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx);
        let mut conn = connector.open(ConnectionId(1), &address).unwrap();
        assert_eq!(conn.ready_state(), ReadyState::Connecting);
        assert!(matches!(conn.send("early"), Err(TransportError::NotOpen)));

        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);
        assert!(conn.is_open());

        conn.send("ping").unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message("ping".to_string())
        );

        conn.close(CLOSE_NORMAL, "bye");
        assert_eq!(conn.ready_state(), ReadyState::Closing);
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed {
                code: CLOSE_NORMAL,
                reason: "bye".to_string()
            }
        );
        assert_eq!(conn.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_server_close_reports_code_and_reason() {
        let address = echo_server(Some((4000, "going away"))).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = WsConnector::new(tx)
            .open(ConnectionId(7), &address)
            .unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);
        conn.send("hi").unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message("hi".to_string())
        );
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed {
                code: 4000,
                reason: "going away".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_binary_frames_are_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::binary(b"bin".to_vec())).await.unwrap();
            ws.send(Message::text("txt".to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = WsConnector::new(tx)
            .open(ConnectionId(3), &format!("ws://{addr}"))
            .unwrap();

        assert_eq!(next_event(&mut rx).await, TransportEvent::Opened);
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Message("txt".to_string())
        );
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = WsConnector::new(tx)
            .open(ConnectionId(2), &format!("ws://{addr}"))
            .unwrap();

        assert!(matches!(
            next_event(&mut rx).await,
            TransportEvent::Error(e) if e.starts_with("WebSocket connection error")
        ));
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: String::new()
            }
        );
    }

    #[tokio::test]
    async fn test_events_carry_connection_id() {
        let address = echo_server(None).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = WsConnector::new(tx)
            .open(ConnectionId(42), &address)
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            DriverEvent::Transport { connection: ConnectionId(42), .. }
        ));
    }

    #[tokio::test]
    async fn test_scheduler_fires_and_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let cancelled = scheduler.schedule(Duration::from_millis(20));
        let fired = scheduler.schedule(Duration::from_millis(40));
        scheduler.cancel(cancelled);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, DriverEvent::Timer(fired));

        let nothing = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(nothing.is_err());
        assert_eq!(scheduler.pending(), 0);
    }
}
