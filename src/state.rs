//! Role and connection-state tracking.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::observer::RelayObservers;

/// What a relay session is doing for its current lifetime. A session owns
/// exactly one role between `close` calls; switching from Hosting to
/// ConnectedAsClient requires an explicit stop first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Idle,
    Hosting,
    ConnectedAsClient,
}

/// Connection state as surfaced to the UI. Distinct from [`Role`]:
/// Hosting persists with zero peers connected (still listening), and
/// Connected exists only for the client role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Hosting,
    Connected,
    Disconnected,
}

/// Tracks the current [`ConnectionState`] and notifies the state observer
/// on every transition.
///
/// Idle is both the initial state and the state reached after an explicit
/// stop/disconnect. There is no terminal state; the machine is reusable
/// across repeated host/connect cycles.
pub struct StateMachine {
    current: Mutex<ConnectionState>,
    observers: Arc<RelayObservers>,
}

impl StateMachine {
    pub fn new(observers: Arc<RelayObservers>) -> Self {
        Self {
            current: Mutex::new(ConnectionState::Idle),
            observers,
        }
    }

    pub fn current(&self) -> ConnectionState {
        *self.current.lock()
    }

    /// Apply a transition and notify the observer. Re-entering the same
    /// state still notifies; the Hosting self-loop is how peer-count
    /// changes reach the UI.
    pub fn set(&self, next: ConnectionState) {
        {
            let mut current = self.current.lock();
            debug!(from = ?*current, to = ?next, "connection state transition");
            *current = next;
        }
        self.observers.emit_state(next);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let machine = StateMachine::new(Arc::new(RelayObservers::new()));
        assert_eq!(machine.current(), ConnectionState::Idle);
    }

    #[test]
    fn test_every_transition_notifies_observer() {
        let observers = Arc::new(RelayObservers::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        observers.set_on_state_changed(move |state| {
            log.lock().push(state);
        });

        let machine = StateMachine::new(Arc::clone(&observers));
        machine.set(ConnectionState::Hosting);
        machine.set(ConnectionState::Hosting); // peer-count self-loop
        machine.set(ConnectionState::Idle);

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionState::Hosting,
                ConnectionState::Hosting,
                ConnectionState::Idle,
            ]
        );
        assert_eq!(machine.current(), ConnectionState::Idle);
    }

    #[test]
    fn test_machine_is_reusable_after_stop() {
        let machine = StateMachine::new(Arc::new(RelayObservers::new()));
        machine.set(ConnectionState::Disconnected);
        machine.set(ConnectionState::Connected);
        machine.set(ConnectionState::Idle);
        machine.set(ConnectionState::Hosting);
        assert_eq!(machine.current(), ConnectionState::Hosting);
    }
}
