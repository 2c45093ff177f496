//! lanlink — LAN peer relay for local multiplayer sessions.
//!
//! This crate establishes a local-network link between participants (one
//! acting as relay host, the rest as clients) and exchanges structured
//! JSON messages between them with at-most-one-relay, broadcast-with-
//! exclusion semantics.
//!
//! # Architecture
//!
//! - **Transport**: WebSocket-based (via `tokio-tungstenite`) text frames,
//!   one envelope per frame, host bound on the wildcard address.
//! - **Protocol**: tolerant JSON envelopes; payloads that are not valid
//!   envelope objects degrade to `raw`/`text` wrappers instead of being
//!   rejected.
//! - **Relaying**: every inbound frame is surfaced to the local observer,
//!   then forwarded to every other registered peer (never the sender).
//! - **Observers**: four single-slot callbacks form the boundary with the
//!   UI layer: message, player-joined, state-changed, error.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use lanlink::{Envelope, RelaySession};
//!
//! # async fn example() {
//! let host = RelaySession::with_defaults();
//! host.on_player_joined(|| println!("second player is here"));
//! let url = host.start_host_default().await; // e.g. ws://192.168.1.50:8888
//!
//! let client = RelaySession::with_defaults();
//! client.on_message(|envelope| println!("got {:?}", envelope.kind));
//! if client.connect_to_host("192.168.1.50").await {
//!     client
//!         .send(Envelope::game_message(
//!             "tic_tac_toe",
//!             "move",
//!             "client",
//!             serde_json::json!({"index": 4}),
//!         ))
//!         .await;
//! }
//! # let _ = url;
//! # }
//! ```

pub mod addr;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod message;
pub mod observer;
pub mod registry;
pub mod session;
pub mod state;
pub mod transport;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use client::ClientLink;
pub use config::{DEFAULT_PORT, RelayConfig};
pub use error::RelayError;
pub use host::HostRelay;
pub use message::Envelope;
pub use observer::RelayObservers;
pub use registry::ConnectionRegistry;
pub use session::RelaySession;
pub use state::{ConnectionState, Role};
pub use transport::{PeerConnection, PeerId};
