//! Host side of the relay: accept loop, upgrade gate, and message fan-out.
//!
//! The host binds the wildcard address, accepts WebSocket upgrades, and
//! runs one independent read loop per peer. Every inbound frame is decoded,
//! surfaced to the local message observer, then re-broadcast to every other
//! registered peer. The host process is simultaneously a message consumer
//! (as a player) and a relay (for the other peers).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::addr;
use crate::error::RelayError;
use crate::message::Envelope;
use crate::observer::RelayObservers;
use crate::registry::ConnectionRegistry;
use crate::state::{ConnectionState, StateMachine};
use crate::transport::{PeerConnection, PeerId};

/// Response for requests that are not WebSocket upgrades. The listening
/// endpoint is single-purpose.
const REJECTION_RESPONSE: &[u8] =
    b"HTTP/1.1 403 Forbidden\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// A running relay host: listening endpoint plus the peer registry.
pub struct HostRelay {
    registry: Arc<ConnectionRegistry>,
    observers: Arc<RelayObservers>,
    state: Arc<StateMachine>,
    shutdown_tx: broadcast::Sender<()>,
    // Flipped once by stop(). Peer loops take this lock around their
    // Hosting notifications, so stop() flipping it cannot interleave
    // with one: after the flip, Idle is the last state anyone emits.
    stopping: Arc<Mutex<bool>>,
    local_addr: SocketAddr,
    connect_url: String,
}

impl HostRelay {
    /// Bind `0.0.0.0:port` and start accepting peers.
    ///
    /// The state machine enters Hosting before the bind so the UI can show
    /// starting feedback; a bind failure is the only fatal outcome and
    /// moves the state to Disconnected. The returned connect URL uses the
    /// resolved LAN address when one is available, and the actual bound
    /// port (relevant when `port` is 0).
    pub async fn start(
        port: u16,
        observers: Arc<RelayObservers>,
        state: Arc<StateMachine>,
    ) -> Result<Self, RelayError> {
        state.set(ConnectionState::Hosting);

        let bind_addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(RelayError::Bind {
                    addr: bind_addr,
                    source: e,
                });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(RelayError::Bind {
                    addr: bind_addr,
                    source: e,
                });
            }
        };

        // Best-effort; "IP unknown" still allows hosting on the wildcard.
        let host_ip = addr::resolve().unwrap_or_else(|| "0.0.0.0".to_string());
        let connect_url = format!("ws://{host_ip}:{}", local_addr.port());

        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, _) = broadcast::channel(8);
        let stopping = Arc::new(Mutex::new(false));

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            Arc::clone(&observers),
            Arc::clone(&state),
            shutdown_tx.clone(),
            Arc::clone(&stopping),
        ));

        info!(%connect_url, "relay hosting");
        Ok(Self {
            registry,
            observers,
            state,
            shutdown_tx,
            stopping,
            local_addr,
            connect_url,
        })
    }

    /// The `ws://<ip>:<port>` URL peers should dial.
    pub fn connect_url(&self) -> &str {
        &self.connect_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        self.registry.count()
    }

    /// Broadcast a self-originated envelope to every peer (no exclusion)
    /// and mirror it to the local message observer, so the host's UI sees
    /// its own sends through the same path as received messages.
    pub async fn send(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(wire) => {
                for (_, failure) in self.registry.broadcast_excluding(&wire, None).await {
                    self.observers.emit_error(failure);
                }
                self.observers.emit_message(envelope.clone());
            }
            Err(e) => self.observers.emit_error(e.into()),
        }
    }

    /// Close every registered peer with a normal-closure code, stop the
    /// listener, and settle at Idle. Calling this when already idle is a
    /// no-op.
    pub async fn stop(&self) {
        {
            // Waits out any in-flight Hosting notification from a peer
            // loop before flipping; further ones are suppressed.
            let mut stopping = self.stopping.lock();
            if *stopping {
                return;
            }
            *stopping = true;
        }
        let _ = self.shutdown_tx.send(());
        self.registry.close_all().await;
        self.state.set(ConnectionState::Idle);
        info!("relay stopped");
    }
}

/// Accept incoming TCP connections until shutdown. Each connection gets
/// its own task; accept errors never kill the loop.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    observers: Arc<RelayObservers>,
    state: Arc<StateMachine>,
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<Mutex<bool>>,
) {
    let mut shutdown = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote_addr)) => {
                        tokio::spawn(serve_peer(
                            stream,
                            remote_addr,
                            Arc::clone(&registry),
                            Arc::clone(&observers),
                            Arc::clone(&state),
                            shutdown_tx.subscribe(),
                            Arc::clone(&stopping),
                        ));
                    }
                    Err(e) => warn!(error = %e, "tcp accept failed"),
                }
            }
            _ = shutdown.recv() => {
                debug!("accept loop shutting down");
                break;
            }
        }
    }
}

/// Upgrade one incoming connection and run its read loop.
async fn serve_peer(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    observers: Arc<RelayObservers>,
    state: Arc<StateMachine>,
    mut shutdown: broadcast::Receiver<()>,
    stopping: Arc<Mutex<bool>>,
) {
    if !is_upgrade_request(&mut stream).await {
        warn!(%remote_addr, "rejected non-upgrade request");
        let _ = stream.write_all(REJECTION_RESPONSE).await;
        let _ = stream.shutdown().await;
        return;
    }

    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%remote_addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (sink, mut inbound) = ws.split();
    let peer_id = {
        let stopping = stopping.lock();
        if *stopping {
            // Relay is shutting down; the socket closes on drop.
            return;
        }
        let peer_id = registry.add(PeerConnection::from_server(remote_addr, sink));
        observers.emit_player_joined();
        state.set(ConnectionState::Hosting); // peer-count self-loop
        peer_id
    };
    info!(peer = %peer_id, %remote_addr, "peer joined");

    loop {
        tokio::select! {
            frame = inbound.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        relay_frame(text.as_str(), &peer_id, &registry, &observers).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(peer = %peer_id, "peer closed");
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary/ping/pong
                    Some(Err(e)) => {
                        debug!(peer = %peer_id, error = %e, "peer read error");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!(peer = %peer_id, "read loop shutting down");
                // close_all drains the registry; no per-peer bookkeeping here.
                return;
            }
        }
    }

    let stopping = stopping.lock();
    if !*stopping && registry.remove(&peer_id) {
        state.set(ConnectionState::Hosting); // peer-count self-loop
    }
}

/// Decode one inbound frame, surface it locally, and forward it to every
/// other peer. Decode never fails, so every frame reaches the observer.
async fn relay_frame(
    text: &str,
    sender: &PeerId,
    registry: &ConnectionRegistry,
    observers: &RelayObservers,
) {
    let envelope = Envelope::decode(text);
    observers.emit_message(envelope.clone());
    match envelope.encode() {
        Ok(wire) => {
            for (_, failure) in registry.broadcast_excluding(&wire, Some(sender)).await {
                observers.emit_error(failure);
            }
        }
        Err(e) => observers.emit_error(e.into()),
    }
}

/// Peek the request head for a WebSocket upgrade without consuming it.
///
/// A handshake can arrive split across TCP segments, so peeking repeats
/// until the head terminator shows up (or the peek buffer fills). A
/// client that never completes its head within the deadline is rejected.
async fn is_upgrade_request(stream: &mut TcpStream) -> bool {
    const HEAD_DEADLINE: Duration = Duration::from_secs(2);

    let mut buf = [0u8; 4096];
    let deadline = tokio::time::sleep(HEAD_DEADLINE);
    tokio::pin!(deadline);

    loop {
        let peeked = tokio::select! {
            peeked = stream.peek(&mut buf) => peeked,
            _ = &mut deadline => return false,
        };
        let n = match peeked {
            Ok(0) | Err(_) => return false,
            Ok(n) => n,
        };
        let head = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
        if head.contains("\r\n\r\n") || n == buf.len() {
            return head.contains("upgrade: websocket");
        }
        // Head still incomplete; let more bytes arrive.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;

    async fn started_host() -> (HostRelay, Arc<RelayObservers>) {
        let observers = Arc::new(RelayObservers::new());
        let state = Arc::new(StateMachine::new(Arc::clone(&observers)));
        let host = HostRelay::start(0, Arc::clone(&observers), state)
            .await
            .unwrap();
        (host, observers)
    }

    #[tokio::test]
    async fn test_start_reports_ws_url_with_bound_port() {
        let (host, _observers) = started_host().await;
        let url = host.connect_url();
        assert!(url.starts_with("ws://"));
        assert!(url.ends_with(&format!(":{}", host.local_addr().port())));
        host.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_reports_disconnected() {
        let observers = Arc::new(RelayObservers::new());
        let state = Arc::new(StateMachine::new(Arc::clone(&observers)));

        // Occupy a port, then try to host on it.
        let blocker = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();

        let result = HostRelay::start(port, observers, Arc::clone(&state)).await;
        assert!(matches!(result, Err(RelayError::Bind { .. })));
        assert_eq!(state.current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_player_joined_fires_once_per_connection() {
        let (host, observers) = started_host().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        observers.set_on_player_joined(move || {
            let _ = tx.send(());
        });

        let port = host.local_addr().port();
        let (_ws_a, _) = connect_async(format!("ws://127.0.0.1:{port}")).await.unwrap();
        rx.recv().await.unwrap();

        let (_ws_b, _) = connect_async(format!("ws://127.0.0.1:{port}")).await.unwrap();
        rx.recv().await.unwrap();

        assert_eq!(host.peer_count(), 2);
        host.stop().await;
    }

    #[tokio::test]
    async fn test_non_upgrade_request_gets_403() {
        let (host, _observers) = started_host().await;
        let port = host.local_addr().port();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 403"));

        // The rejected request never became a peer.
        assert_eq!(host.peer_count(), 0);
        host.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_disconnects_peers() {
        let (host, observers) = started_host().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        observers.set_on_player_joined(move || {
            let _ = tx.send(());
        });

        let port = host.local_addr().port();
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}")).await.unwrap();
        rx.recv().await.unwrap();

        host.stop().await;
        host.stop().await; // no-op

        // The peer observes the close.
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Message::Close(_)));
        assert_eq!(host.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_handshake_split_across_segments_is_accepted() {
        let (host, observers) = started_host().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        observers.set_on_player_joined(move || {
            let _ = tx.send(());
        });
        let port = host.local_addr().port();

        let request = concat!(
            "GET / HTTP/1.1\r\n",
            "Host: localhost\r\n",
            "Connection: Upgrade\r\n",
            "Upgrade: websocket\r\n",
            "Sec-WebSocket-Version: 13\r\n",
            "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
            "\r\n",
        );
        // Break before the Upgrade header so the first segment alone
        // looks like a plain HTTP request.
        let (first, rest) = request.split_at(20);

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(first.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.write_all(rest.as_bytes()).await.unwrap();

        let mut buf = [0u8; 256];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 101"));

        rx.recv().await.unwrap();
        assert_eq!(host.peer_count(), 1);
        host.stop().await;
    }

    #[tokio::test]
    async fn test_peer_close_racing_stop_settles_at_idle() {
        // A peer socket dropping while stop() runs must not leave a
        // Hosting notification after the final Idle.
        for _ in 0..20 {
            let (host, observers) = started_host().await;
            let (tx, mut rx) = mpsc::unbounded_channel();
            observers.set_on_player_joined(move || {
                let _ = tx.send(());
            });
            let seen: Arc<Mutex<Vec<ConnectionState>>> = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&seen);
            observers.set_on_state_changed(move |next| log.lock().push(next));

            let port = host.local_addr().port();
            let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}")).await.unwrap();
            rx.recv().await.unwrap();

            let closer = tokio::spawn(async move { drop(ws) });
            host.stop().await;
            closer.await.unwrap();

            tokio::time::sleep(Duration::from_millis(50)).await;
            let seen = seen.lock();
            assert_eq!(seen.last(), Some(&ConnectionState::Idle));
        }
    }
}
