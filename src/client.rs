//! Client side of the relay: a single outbound link to a host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::message::Envelope;
use crate::observer::RelayObservers;
use crate::state::{ConnectionState, StateMachine};
use crate::transport::PeerConnection;

/// An established outbound connection to a relay host.
///
/// A client never relays: its read loop only decodes inbound frames and
/// forwards them to the local message observer.
pub struct ClientLink {
    conn: Arc<AsyncMutex<PeerConnection>>,
    state: Arc<StateMachine>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ClientLink {
    /// Open `ws://host:port`, bounded by `connect_timeout`.
    ///
    /// On success the state machine enters Connected and the read loop is
    /// running. On timeout or refusal the state settles at Disconnected;
    /// retry/backoff policy belongs to the caller.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        observers: Arc<RelayObservers>,
        state: Arc<StateMachine>,
    ) -> Result<Self, RelayError> {
        let url = format!("ws://{host}:{port}");

        let ws = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Err(_) => {
                state.set(ConnectionState::Disconnected);
                return Err(RelayError::ConnectTimeout(url, connect_timeout));
            }
            Ok(Err(e)) => {
                state.set(ConnectionState::Disconnected);
                return Err(RelayError::Connect(url, e.to_string()));
            }
            Ok(Ok((ws, _response))) => ws,
        };

        // Diagnostics only; hostnames fall back to an unspecified address.
        let remote_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));

        let (sink, mut inbound) = ws.split();
        let conn = Arc::new(AsyncMutex::new(PeerConnection::from_client(
            remote_addr,
            sink,
        )));

        state.set(ConnectionState::Connected);
        info!(%url, "connected to host");

        let (shutdown_tx, mut shutdown) = broadcast::channel(4);
        let loop_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                observers.emit_message(Envelope::decode(text.as_str()));
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("host closed the connection");
                                loop_state.set(ConnectionState::Disconnected);
                                break;
                            }
                            Some(Ok(_)) => {} // Ignore binary/ping/pong
                            Some(Err(e)) => {
                                debug!(error = %e, "read error from host");
                                loop_state.set(ConnectionState::Disconnected);
                                break;
                            }
                        }
                    }
                    // Explicit disconnect: the caller sets the final state.
                    _ = shutdown.recv() => break,
                }
            }
        });

        Ok(Self {
            conn,
            state,
            shutdown_tx,
        })
    }

    /// Send one envelope over the single outbound socket.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), RelayError> {
        let wire = envelope.encode()?;
        self.conn.lock().await.send_text(&wire).await
    }

    /// Close with a normal-closure code and settle at Idle. Calling this
    /// when already idle is a no-op.
    pub async fn disconnect(&self) {
        if self.state.current() == ConnectionState::Idle {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.conn.lock().await.close().await;
        self.state.set(ConnectionState::Idle);
        info!("disconnected from host");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
