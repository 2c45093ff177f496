//! Session facade: one role per session and the unified send surface.
//!
//! The UI constructs one [`RelaySession`] per play session, registers its
//! callbacks, assigns the session a role with `start_host` or `connect`,
//! and from then on only calls `send`/`close`. Socket acceptance, relaying,
//! and state tracking all happen inside the components this facade owns.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::client::ClientLink;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::host::HostRelay;
use crate::message::Envelope;
use crate::observer::RelayObservers;
use crate::state::{ConnectionState, Role, StateMachine};

/// A LAN relay session, acting as host or client for its lifetime
/// between `close` calls.
pub struct RelaySession {
    config: RelayConfig,
    observers: Arc<RelayObservers>,
    state: Arc<StateMachine>,
    role: Mutex<Role>,
    host: AsyncMutex<Option<HostRelay>>,
    client: AsyncMutex<Option<ClientLink>>,
}

impl RelaySession {
    pub fn new(config: RelayConfig) -> Self {
        let observers = Arc::new(RelayObservers::new());
        let state = Arc::new(StateMachine::new(Arc::clone(&observers)));
        Self {
            config,
            observers,
            state,
            role: Mutex::new(Role::Idle),
            host: AsyncMutex::new(None),
            client: AsyncMutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    // ── Observer registration (single-slot, last wins) ──────────────────

    pub fn on_message(&self, observer: impl Fn(Envelope) + Send + Sync + 'static) {
        self.observers.set_on_message(observer);
    }

    pub fn on_player_joined(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.set_on_player_joined(observer);
    }

    pub fn on_state_changed(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.observers.set_on_state_changed(observer);
    }

    pub fn on_error(&self, observer: impl Fn(RelayError) + Send + Sync + 'static) {
        self.observers.set_on_error(observer);
    }

    // ── Role assignment ─────────────────────────────────────────────────

    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Start hosting on the given port. Returns the `ws://<ip>:<port>`
    /// URL peers should dial, or `None` when the bind fails (reported
    /// through the error observer) or the session already has a role.
    pub async fn start_host(&self, port: u16) -> Option<String> {
        if self.role() != Role::Idle {
            warn!(role = ?self.role(), "start_host ignored: session already has a role");
            return None;
        }

        match HostRelay::start(port, Arc::clone(&self.observers), Arc::clone(&self.state)).await {
            Ok(host) => {
                let url = host.connect_url().to_string();
                *self.host.lock().await = Some(host);
                *self.role.lock() = Role::Hosting;
                Some(url)
            }
            Err(e) => {
                self.observers.emit_error(e);
                None
            }
        }
    }

    /// `start_host` on the configured port (default 8888).
    pub async fn start_host_default(&self) -> Option<String> {
        self.start_host(self.config.port).await
    }

    /// Connect to a host on the configured port (default 8888).
    pub async fn connect_to_host(&self, host: &str) -> bool {
        self.connect(host, self.config.port).await
    }

    /// Connect to `ws://host:port`, bounded by the configured timeout.
    /// Failures are reported through the error observer; the caller owns
    /// any retry policy.
    pub async fn connect(&self, host: &str, port: u16) -> bool {
        if self.role() != Role::Idle {
            warn!(role = ?self.role(), "connect ignored: session already has a role");
            return false;
        }

        let result = ClientLink::connect(
            host,
            port,
            self.config.connect_timeout,
            Arc::clone(&self.observers),
            Arc::clone(&self.state),
        )
        .await;

        match result {
            Ok(link) => {
                *self.client.lock().await = Some(link);
                *self.role.lock() = Role::ConnectedAsClient;
                true
            }
            Err(e) => {
                self.observers.emit_error(e);
                false
            }
        }
    }

    // ── Unified send surface ────────────────────────────────────────────

    /// Fire-and-forget send. Hosting: broadcast to all peers and mirror to
    /// the local message observer. Client: send over the single socket.
    /// Otherwise the error observer receives a not-connected fault; the
    /// call never panics or returns an error.
    pub async fn send(&self, envelope: Envelope) {
        match (self.role(), self.state.current()) {
            (Role::Hosting, ConnectionState::Hosting) => {
                if let Some(host) = self.host.lock().await.as_ref() {
                    host.send(&envelope).await;
                }
            }
            (Role::ConnectedAsClient, ConnectionState::Connected) => {
                if let Some(client) = self.client.lock().await.as_ref() {
                    if let Err(e) = client.send(&envelope).await {
                        self.observers.emit_error(e);
                    }
                }
            }
            _ => self.observers.emit_error(RelayError::NotConnected),
        }
    }

    /// Run raw text through the tolerant decode chain and send the result,
    /// so plain text is always sendable.
    pub async fn send_text(&self, raw: &str) {
        self.send(Envelope::decode(raw)).await;
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Stop hosting or disconnect, returning the session to Idle so it can
    /// be reused for a fresh `start_host`/`connect`. No-op when idle.
    pub async fn close(&self) {
        if let Some(host) = self.host.lock().await.take() {
            host.stop().await;
        }
        if let Some(client) = self.client.lock().await.take() {
            client.disconnect().await;
        }
        *self.role.lock() = Role::Idle;
    }

    /// Peers currently connected (zero unless hosting). Backs the UI's
    /// connected-player indicator.
    pub async fn peer_count(&self) -> usize {
        match self.host.lock().await.as_ref() {
            Some(host) => host.peer_count(),
            None => 0,
        }
    }

    /// The URL peers should dial, when hosting.
    pub async fn connect_url(&self) -> Option<String> {
        self.host
            .lock()
            .await
            .as_ref()
            .map(|host| host.connect_url().to_string())
    }

    /// The actual bound port, when hosting. Meaningful when hosting was
    /// started on port 0.
    pub async fn local_port(&self) -> Option<u16> {
        self.host
            .lock()
            .await
            .as_ref()
            .map(|host| host.local_addr().port())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
