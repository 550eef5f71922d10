//! Connection state notifier
//!
//! Holds the last broadcast [`ConnectionState`] and the registered
//! listeners. A state is only broadcast when it differs from the previous
//! one, so listeners never see the same state twice in a row.
//!
//! Listener registration and broadcast share one lock, independent of the
//! USB session lock. Listeners must not call back into the notifier from
//! `on_keyboard_state_changed`.

use protocol::ConnectionState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Receives keyboard connection state changes
pub trait KeyboardStateListener: Send + Sync {
    fn on_keyboard_state_changed(&self, state: ConnectionState);
}

impl<F> KeyboardStateListener for F
where
    F: Fn(ConnectionState) + Send + Sync,
{
    fn on_keyboard_state_changed(&self, state: ConnectionState) {
        self(state)
    }
}

/// Registration token returned by [`StateNotifier::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct NotifierInner {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn KeyboardStateListener>)>,
    /// Last broadcast state, `None` before the first broadcast
    last: Option<ConnectionState>,
}

#[derive(Default)]
pub struct StateNotifier {
    inner: Mutex<NotifierInner>,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking listener must not wedge every later broadcast
    fn lock(&self) -> MutexGuard<'_, NotifierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast `state` to every listener, in registration order
    ///
    /// Returns false (and notifies nobody) if `state` equals the last
    /// broadcast state.
    pub fn set_state(&self, state: ConnectionState) -> bool {
        let mut inner = self.lock();
        if inner.last == Some(state) {
            debug!("Keyboard state unchanged ({})", state);
            return false;
        }

        info!(
            "Keyboard state changed to {} ({} listeners)",
            state,
            inner.listeners.len()
        );
        for (_, listener) in &inner.listeners {
            listener.on_keyboard_state_changed(state);
        }
        inner.last = Some(state);
        true
    }

    /// Last broadcast state
    pub fn current(&self) -> Option<ConnectionState> {
        self.lock().last
    }

    pub fn add_listener(&self, listener: Arc<dyn KeyboardStateListener>) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, listener));
        id
    }

    /// Returns false if `id` was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        inner.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<ConnectionState>>>, Arc<dyn KeyboardStateListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn KeyboardStateListener> =
            Arc::new(move |state: ConnectionState| sink.lock().unwrap().push(state));
        (seen, listener)
    }

    #[test]
    fn test_duplicate_state_not_rebroadcast() {
        let notifier = StateNotifier::new();
        let (seen, listener) = recorder();
        notifier.add_listener(listener);

        assert!(notifier.set_state(ConnectionState::Connected));
        assert!(!notifier.set_state(ConnectionState::Connected));

        assert_eq!(*seen.lock().unwrap(), vec![ConnectionState::Connected]);
        assert_eq!(notifier.current(), Some(ConnectionState::Connected));
    }

    #[test]
    fn test_first_disconnected_is_broadcast() {
        let notifier = StateNotifier::new();
        let (seen, listener) = recorder();
        notifier.add_listener(listener);

        assert_eq!(notifier.current(), None);
        notifier.set_state(ConnectionState::Disconnected);
        notifier.set_state(ConnectionState::Connected);
        notifier.set_state(ConnectionState::Disconnected);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connected,
                ConnectionState::Disconnected
            ]
        );
    }

    #[test]
    fn test_registration_order() {
        let notifier = StateNotifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            notifier.add_listener(Arc::new(move |_state: ConnectionState| {
                order.lock().unwrap().push(tag)
            }));
        }

        notifier.set_state(ConnectionState::Connected);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_removed_listener_not_notified() {
        let notifier = StateNotifier::new();
        let (seen, listener) = recorder();
        let id = notifier.add_listener(listener);

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        assert_eq!(notifier.listener_count(), 0);

        notifier.set_state(ConnectionState::Connected);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_registration_during_broadcast() {
        let notifier = Arc::new(StateNotifier::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let notifier = notifier.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let calls = calls.clone();
                        let id = notifier.add_listener(Arc::new(move |_state: ConnectionState| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        }));
                        notifier.remove_listener(id);
                    }
                })
            })
            .collect();

        for i in 0..100 {
            let state = if i % 2 == 0 {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            notifier.set_state(state);
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_poison() {
        let notifier = Arc::new(StateNotifier::new());
        notifier.add_listener(Arc::new(|_state: ConnectionState| {
            panic!("listener failure");
        }));

        let n = notifier.clone();
        let result = std::thread::spawn(move || n.set_state(ConnectionState::Connected)).join();
        assert!(result.is_err());

        // The notifier is still usable afterwards
        assert_eq!(notifier.listener_count(), 1);
    }
}
