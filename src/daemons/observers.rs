//! # Observer registry for daemon authors.
//!
//! [`Observers`] keeps the set of registered [`DaemonObserver`]s and fans a signal out to
//! each of them. Embed it in a daemon and forward `register_observer` /
//! `unregister_observer` to it.
//!
//! The list is snapshotted before delivery, so an observer may (un)register during a
//! callback without deadlocking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::daemons::daemon::{Daemon, ObserverRef};
use crate::error::{BoxError, DaemonFault};

/// Cloneable set of observers; clones share the same list.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Mutex<Vec<ObserverRef>>>,
}

impl Observers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self) -> MutexGuard<'_, Vec<ObserverRef>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<ObserverRef> {
        self.list().clone()
    }

    /// Adds `observer` unless it is already registered.
    ///
    /// Returns `true` if it was added.
    pub fn register(&self, observer: ObserverRef) -> bool {
        let mut list = self.list();
        if list.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        list.push(observer);
        true
    }

    /// Removes `observer`. Returns `true` if it was registered.
    pub fn unregister(&self, observer: &ObserverRef) -> bool {
        let mut list = self.list();
        let before = list.len();
        list.retain(|o| !Arc::ptr_eq(o, observer));
        list.len() != before
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.list().len()
    }

    /// Returns true if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    /// Sends a heartbeat for `daemon`.
    pub fn heartbeat(&self, daemon: &dyn Daemon) {
        for o in self.snapshot() {
            o.receive_heartbeat(daemon);
        }
    }

    /// Reports normal termination of `daemon`.
    pub fn terminated_normally(&self, daemon: &dyn Daemon) {
        for o in self.snapshot() {
            o.terminated_normally(daemon);
        }
    }

    /// Reports exceptional termination of `daemon`.
    ///
    /// The cause is wrapped once, so every observer sees the same fault identity.
    pub fn terminated_exceptionally(&self, daemon: &dyn Daemon, cause: BoxError) {
        let fault = DaemonFault::wrap(daemon.identification(), cause);
        for o in self.snapshot() {
            o.terminated_exceptionally(daemon, Box::new(fault.clone()));
        }
    }

    /// Reports a fault of a still-running `daemon`.
    pub fn exception_occurred(&self, daemon: &dyn Daemon, fault: DaemonFault) {
        for o in self.snapshot() {
            o.exception_occurred(daemon, fault.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemons::daemon::DaemonObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        beats: AtomicUsize,
    }

    impl DaemonObserver for Counting {
        fn receive_heartbeat(&self, _daemon: &dyn Daemon) {
            self.beats.fetch_add(1, Ordering::SeqCst);
        }
        fn terminated_normally(&self, _daemon: &dyn Daemon) {}
        fn terminated_exceptionally(&self, _daemon: &dyn Daemon, _cause: BoxError) {}
        fn exception_occurred(&self, _daemon: &dyn Daemon, _fault: DaemonFault) {}
    }

    #[test]
    fn register_ignores_duplicates() {
        let observers = Observers::new();
        let sink: ObserverRef = Arc::new(Counting::default());

        assert!(observers.register(sink.clone()));
        assert!(!observers.register(sink.clone()));
        assert_eq!(observers.len(), 1);

        assert!(observers.unregister(&sink));
        assert!(!observers.unregister(&sink));
        assert!(observers.is_empty());
    }

    #[test]
    fn clones_share_the_list() {
        let observers = Observers::new();
        let other = observers.clone();
        other.register(Arc::new(Counting::default()));
        assert_eq!(observers.len(), 1);
    }
}
