//! Relay error types.

use std::time::Duration;

/// Errors that can occur in the lanlink crate.
///
/// Every variant is recoverable: faults are caught at the boundary where
/// they occur and routed to the session's error observer or returned from
/// the failing call. None of them propagate out of the internal loops.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The listening endpoint could not be bound. Fatal to that `start`
    /// call only.
    #[error("bind on {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// An outbound connection attempt exceeded the configured timeout.
    #[error("connect to {0} timed out after {1:?}")]
    ConnectTimeout(String, Duration),

    /// An outbound connection attempt was refused or failed outright.
    #[error("connect to {0} failed: {1}")]
    Connect(String, String),

    /// Delivery to a single peer failed. Non-fatal; the peer stays
    /// registered until its socket closes.
    #[error("send to peer {0} failed: {1}")]
    PeerSend(String, String),

    /// A send was attempted with no host or client connection active.
    #[error("not connected")]
    NotConnected,

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
