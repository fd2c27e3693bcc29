//! Subscriber registry: the set of sessions that receive broadcasts.
//!
//! This is the only state shared between the accept loop, the session tasks,
//! the dispatch loop, and the broadcast engine.  All access goes through
//! [`SubscriberRegistry::add`], [`SubscriberRegistry::remove`], and
//! [`SubscriberRegistry::snapshot`].
//!
//! A plain `std::sync::Mutex` is enough: the lock is held only long enough to
//! insert, remove, or clone a handful of `Arc`s, and never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::application::session::{Session, SessionId};

/// Errors returned by [`SubscriberRegistry::add`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The configured subscriber cap has been reached.
    #[error("subscriber limit of {limit} reached")]
    Full { limit: usize },
}

/// Thread-safe set of live sessions.
#[derive(Debug)]
pub struct SubscriberRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    max_sessions: usize,
}

impl SubscriberRegistry {
    /// Creates an empty registry holding at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session.
    ///
    /// Every accepted connection has a fresh [`SessionId`], so no duplicate
    /// check is needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Full`] if the registry already holds
    /// `max_sessions` sessions.
    pub fn add(&self, session: Arc<Session>) -> Result<usize, RegistryError> {
        let mut sessions = self.lock();
        if sessions.len() >= self.max_sessions {
            return Err(RegistryError::Full {
                limit: self.max_sessions,
            });
        }
        sessions.insert(session.id(), session);
        Ok(sessions.len())
    }

    /// Removes a session if present.
    ///
    /// Idempotent: returns `true` only for the call that actually removed it,
    /// so concurrent removals of the same session are harmless.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!("session {id} removed from registry");
        }
        removed
    }

    /// Returns a point-in-time copy of the current members.
    ///
    /// The lock is released before this returns, so callers may iterate (and
    /// `.await`) while other tasks add or remove sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    /// Removes and returns every session.  Used by shutdown.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.lock().drain().map(|(_, s)| s).collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_sessions
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::tests::{session_with, RecordingTransport};

    fn session() -> Arc<Session> {
        session_with(RecordingTransport::default())
    }

    #[test]
    fn test_new_registry_is_empty() {
        let reg = SubscriberRegistry::new(8);
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn test_add_then_snapshot_contains_session() {
        // Arrange
        let reg = SubscriberRegistry::new(8);
        let s = session();

        // Act
        let count = reg.add(Arc::clone(&s)).unwrap();

        // Assert
        assert_eq!(count, 1);
        assert!(reg.contains(s.id()));
        assert_eq!(reg.snapshot()[0].id(), s.id());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let reg = SubscriberRegistry::new(8);
        let s = session();
        reg.add(Arc::clone(&s)).unwrap();

        assert!(reg.remove(s.id()), "first removal removes");
        assert!(!reg.remove(s.id()), "second removal is a no-op");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_unknown_session_is_noop() {
        let reg = SubscriberRegistry::new(8);
        reg.add(session()).unwrap();
        assert!(!reg.remove(SessionId::new()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_add_beyond_capacity_is_rejected() {
        let reg = SubscriberRegistry::new(2);
        reg.add(session()).unwrap();
        reg.add(session()).unwrap();

        let result = reg.add(session());

        assert_eq!(result, Err(RegistryError::Full { limit: 2 }));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_mutation() {
        // Arrange
        let reg = SubscriberRegistry::new(8);
        let a = session();
        let b = session();
        reg.add(Arc::clone(&a)).unwrap();
        reg.add(Arc::clone(&b)).unwrap();

        // Act: snapshot, then mutate the registry
        let snap = reg.snapshot();
        reg.remove(a.id());
        reg.add(session()).unwrap();

        // Assert: the snapshot still shows the original two members
        assert_eq!(snap.len(), 2);
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(a.id()));
    }

    #[test]
    fn test_drain_empties_registry() {
        let reg = SubscriberRegistry::new(8);
        reg.add(session()).unwrap();
        reg.add(session()).unwrap();

        let drained = reg.drain();

        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_concurrent_add_and_remove_from_threads() {
        let reg = Arc::new(SubscriberRegistry::new(1024));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let s = session();
                        reg.add(Arc::clone(&s)).unwrap();
                        let _ = reg.snapshot();
                        assert!(reg.remove(s.id()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(reg.is_empty());
    }
}
