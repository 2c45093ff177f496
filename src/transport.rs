//! WebSocket connection handles.
//!
//! [`PeerConnection`] wraps the write half of one socket, giving the
//! registry and the client link a uniform send/close surface. The read
//! half is consumed by the owning read loop in `host` or `client`.

use std::fmt;
use std::net::SocketAddr;

use futures::SinkExt;
use futures::stream::SplitSink;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::RelayError;

/// Opaque handle identifying one peer socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(uuid::Uuid);

impl PeerId {
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type alias for the write half of a server-accepted WebSocket.
type ServerSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Type alias for the write half of a client-initiated WebSocket.
type ClientSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// The write side can be either a server-accepted or client-initiated socket.
enum PeerSink {
    Server(ServerSink),
    Client(ClientSink),
}

/// The write half of an active socket, plus identity and the remote
/// address (best-effort, diagnostics only).
pub struct PeerConnection {
    id: PeerId,
    remote_addr: SocketAddr,
    sink: PeerSink,
}

impl PeerConnection {
    /// Wrap a server-accepted WebSocket sink.
    pub(crate) fn from_server(remote_addr: SocketAddr, sink: ServerSink) -> Self {
        Self {
            id: PeerId::generate(),
            remote_addr,
            sink: PeerSink::Server(sink),
        }
    }

    /// Wrap a client-initiated WebSocket sink.
    pub(crate) fn from_client(remote_addr: SocketAddr, sink: ClientSink) -> Self {
        Self {
            id: PeerId::generate(),
            remote_addr,
            sink: PeerSink::Client(sink),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Send one text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), RelayError> {
        let msg = Message::Text(text.to_string().into());
        let result = match &mut self.sink {
            PeerSink::Server(sink) => sink.send(msg).await,
            PeerSink::Client(sink) => sink.send(msg).await,
        };
        result.map_err(|e| RelayError::PeerSend(self.id.to_string(), e.to_string()))
    }

    /// Send a normal-closure frame. Errors are ignored; the socket is
    /// going away either way.
    pub async fn close(&mut self) {
        let msg = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        match &mut self.sink {
            PeerSink::Server(sink) => {
                let _ = sink.send(msg).await;
            }
            PeerSink::Client(sink) => {
                let _ = sink.send(msg).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
