//! WebSocket bridge for embedding frames.
//!
//! An acceptor thread hands each connection to its own thread, which does
//! the handshake and then polls the (non-blocking) socket and the outgoing
//! queue in turn:
//!
//! ```text
//! frame --[FrameMessage]--> connection thread --[BridgeEvent]--> coordinator
//!   ^                              |
//!   +---------[FrameCommand]-------+  <-- FrameSender
//! ```
//!
//! A connection lives as long as both ends do. Dropping every [`FrameSender`]
//! of a connection closes it, which is how the coordinator refuses a frame.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::protocol::{FrameCommand, FrameMessage, FrameSender};

/// Maximum port retry attempts for a fixed port
const MAX_PORT_RETRIES: u16 = 10;

/// Idle wait between polls.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What happened on a frame connection.
#[derive(Debug)]
pub enum BridgeEvent {
    Opened { id: u64, sender: FrameSender },
    Message { id: u64, msg: FrameMessage },
    Closed { id: u64 },
}

/// Bound bridge endpoint.
#[derive(Debug, Clone, Copy)]
pub struct FrameBridge {
    addr: SocketAddr,
}

impl FrameBridge {
    /// Bind `addr` and start accepting frames. Connection events are
    /// delivered on `events`.
    ///
    /// A busy fixed port is retried on the following ones; port 0 picks any.
    pub fn start(addr: SocketAddr, events: mpsc::UnboundedSender<BridgeEvent>) -> Result<Self> {
        let listener = try_bind(addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        std::thread::Builder::new()
            .name("frame-bridge".into())
            .spawn(move || accept_loop(listener, events))
            .context("failed to spawn bridge thread")?;

        Ok(Self { addr })
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL the embedding frame connects to.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<BridgeEvent>) {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    while !events.is_closed() {
        match listener.accept() {
            Ok((stream, peer)) => {
                crate::debug!("bridge"; "connection from {}", peer);
                // Set blocking for the handshake
                let _ = stream.set_nonblocking(false);
                let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
                let events = events.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("frame-{id}"))
                    .spawn(move || serve_connection(id, stream, events));
                if let Err(e) = spawned {
                    crate::log!("bridge"; "failed to spawn connection thread: {}", e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                crate::log!("bridge"; "accept error: {}", e);
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn serve_connection(id: u64, stream: TcpStream, events: mpsc::UnboundedSender<BridgeEvent>) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            crate::log!("bridge"; "handshake failed: {}", e);
            return;
        }
    };
    // Now set non-blocking for polling reads
    if let Err(e) = ws.get_ref().set_nonblocking(true) {
        crate::log!("bridge"; "{}", e);
        return;
    }

    let (sender, mut outgoing) = FrameSender::channel();
    if events.send(BridgeEvent::Opened { id, sender }).is_err() {
        return;
    }
    crate::debug!("bridge"; "frame #{} connected", id);

    let reason = pump(id, &mut ws, &mut outgoing, &events);
    crate::debug!("bridge"; "frame #{} closed: {}", id, reason);
    let _ = ws.close(None);
    let _ = ws.flush();
    let _ = events.send(BridgeEvent::Closed { id });
}

/// Shuttle messages until either side goes away. Returns why.
fn pump(
    id: u64,
    ws: &mut WebSocket<TcpStream>,
    outgoing: &mut mpsc::UnboundedReceiver<FrameCommand>,
    events: &mpsc::UnboundedSender<BridgeEvent>,
) -> String {
    loop {
        let mut idle = true;

        loop {
            match outgoing.try_recv() {
                Ok(cmd) => {
                    idle = false;
                    let text = match serde_json::to_string(&cmd) {
                        Ok(text) => text,
                        Err(e) => {
                            crate::log!("bridge"; "cannot encode {:?}: {}", cmd, e);
                            continue;
                        }
                    };
                    match ws.send(Message::Text(text.into())) {
                        Ok(()) => {}
                        Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
                        Err(e) => return e.to_string(),
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return "released by coordinator".into(),
            }
        }
        // Writes queued while the socket was full
        match ws.flush() {
            Ok(()) => {}
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return e.to_string(),
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                idle = false;
                match FrameMessage::parse(&text) {
                    Ok(msg) => {
                        if events.send(BridgeEvent::Message { id, msg }).is_err() {
                            return "coordinator gone".into();
                        }
                    }
                    Err(e) => crate::debug!("bridge"; "ignoring message {}: {}", text.as_str(), e),
                }
            }
            Ok(Message::Close(_)) => return "closed by frame".into(),
            Ok(_) => idle = false,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return e.to_string(),
        }

        if idle {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Bind `addr`, trying the next ports if a fixed one is taken.
fn try_bind(addr: SocketAddr) -> Result<TcpListener> {
    let attempts = if addr.port() == 0 { 1 } else { MAX_PORT_RETRIES };
    let mut last_error = None;

    for offset in 0..attempts {
        let mut candidate = addr;
        candidate.set_port(addr.port().saturating_add(offset));
        match TcpListener::bind(candidate) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind frame bridge on {} after {} attempts: {}",
        addr,
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelState;
    use std::net::Ipv4Addr;

    fn start() -> (FrameBridge, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = FrameBridge::start(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), tx).unwrap();
        (bridge, rx)
    }

    fn read_text(ws: &mut WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>>) -> String {
        loop {
            match ws.read().unwrap() {
                Message::Text(text) => return text.as_str().to_string(),
                _ => continue,
            }
        }
    }

    #[test]
    fn test_frame_round_trip() {
        let (bridge, mut rx) = start();
        assert!(bridge.url().starts_with("ws://127.0.0.1:"));
        let (mut client, _) = tungstenite::connect(bridge.url()).unwrap();

        let Some(BridgeEvent::Opened { id, sender }) = rx.blocking_recv() else {
            panic!("expected an open event");
        };

        client
            .send(Message::Text(
                r#"{"msg":"discloseOrigin","origin":"vscode-webview://x"}"#.into(),
            ))
            .unwrap();
        client.send(Message::Text("not json".into())).unwrap();
        client
            .send(Message::Text(r#"{"msg":"restartServer"}"#.into()))
            .unwrap();

        match rx.blocking_recv() {
            Some(BridgeEvent::Message { id: from, msg }) => {
                assert_eq!(from, id);
                assert_eq!(
                    msg,
                    FrameMessage::DiscloseOrigin {
                        origin: "vscode-webview://x".into()
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        // The garbage in between was dropped
        assert!(matches!(
            rx.blocking_recv(),
            Some(BridgeEvent::Message {
                msg: FrameMessage::RestartServer,
                ..
            })
        ));

        sender.send(FrameCommand::SetState {
            state: PanelState::server_starting(),
        });
        let text = read_text(&mut client);
        assert_eq!(text, r#"{"msg":"setState","state":{"type":"serverStarting"}}"#);

        client.close(None).unwrap();
        loop {
            match rx.blocking_recv() {
                Some(BridgeEvent::Closed { id: closed }) => {
                    assert_eq!(closed, id);
                    break;
                }
                Some(_) => continue,
                None => panic!("bridge channel closed"),
            }
        }
    }

    #[test]
    fn test_dropping_sender_closes_connection() {
        let (bridge, mut rx) = start();
        let (mut client, _) = tungstenite::connect(bridge.url()).unwrap();

        let Some(BridgeEvent::Opened { sender, .. }) = rx.blocking_recv() else {
            panic!("expected an open event");
        };
        drop(sender);

        assert!(matches!(rx.blocking_recv(), Some(BridgeEvent::Closed { .. })));
        // The frame sees the close
        loop {
            match client.read() {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }

    #[test]
    fn test_fixed_port_retries_next() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();
        let listener = try_bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), port);
    }
}
