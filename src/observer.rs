//! Observer callbacks — the boundary contract with the UI layer.
//!
//! Each observer is a single slot: registering a new callback replaces
//! the previous one (last registration wins). The relay's internal loops
//! only ever see one listener at a time, matching how screens take over
//! the callbacks as the user navigates.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RelayError;
use crate::message::Envelope;
use crate::state::ConnectionState;

/// Fires for every inbound envelope (host: from any peer; client: from
/// the host), and for the host's own sends.
pub type MessageObserver = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Host-only; fires once per newly accepted peer.
pub type PlayerJoinedObserver = Arc<dyn Fn() + Send + Sync>;

/// Fires on every state transition, including Hosting self-loops on
/// peer-count changes.
pub type StateObserver = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Fires on any recoverable fault.
pub type ErrorObserver = Arc<dyn Fn(RelayError) + Send + Sync>;

/// The four single-slot observers of a relay session.
#[derive(Default)]
pub struct RelayObservers {
    on_message: Mutex<Option<MessageObserver>>,
    on_player_joined: Mutex<Option<PlayerJoinedObserver>>,
    on_state_changed: Mutex<Option<StateObserver>>,
    on_error: Mutex<Option<ErrorObserver>>,
}

impl RelayObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_message(&self, observer: impl Fn(Envelope) + Send + Sync + 'static) {
        *self.on_message.lock() = Some(Arc::new(observer));
    }

    pub fn set_on_player_joined(&self, observer: impl Fn() + Send + Sync + 'static) {
        *self.on_player_joined.lock() = Some(Arc::new(observer));
    }

    pub fn set_on_state_changed(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        *self.on_state_changed.lock() = Some(Arc::new(observer));
    }

    pub fn set_on_error(&self, observer: impl Fn(RelayError) + Send + Sync + 'static) {
        *self.on_error.lock() = Some(Arc::new(observer));
    }

    // The slot is cloned out before invocation so a callback can
    // re-register observers without deadlocking.

    pub fn emit_message(&self, envelope: Envelope) {
        let slot = self.on_message.lock().clone();
        if let Some(observer) = slot {
            observer(envelope);
        }
    }

    pub fn emit_player_joined(&self) {
        let slot = self.on_player_joined.lock().clone();
        if let Some(observer) = slot {
            observer();
        }
    }

    pub fn emit_state(&self, state: ConnectionState) {
        let slot = self.on_state_changed.lock().clone();
        if let Some(observer) = slot {
            observer(state);
        }
    }

    pub fn emit_error(&self, error: RelayError) {
        let slot = self.on_error.lock().clone();
        if let Some(observer) = slot {
            observer(error);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_without_observer_is_noop() {
        let observers = RelayObservers::new();
        observers.emit_player_joined();
        observers.emit_state(ConnectionState::Hosting);
        observers.emit_error(RelayError::NotConnected);
        observers.emit_message(Envelope::text("hi"));
    }

    #[test]
    fn test_last_registration_wins() {
        let observers = RelayObservers::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        observers.set_on_player_joined(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        observers.set_on_player_joined(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit_player_joined();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_can_reregister_from_callback() {
        let observers = Arc::new(RelayObservers::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let obs = Arc::clone(&observers);
        let counter = Arc::clone(&hits);
        observers.set_on_player_joined(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            obs.set_on_player_joined(|| {});
        });

        observers.emit_player_joined();
        observers.emit_player_joined();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
