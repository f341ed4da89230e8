//! Session registry.
//!
//! Maps session IDs to live sessions so transports can find the session a
//! request belongs to. Sessions created here remove themselves when their
//! disconnect timeout elapses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           SessionRegistry               │
//! │  ┌─────────────────────────────────┐    │
//! │  │ SessionId=a → Session (attached)│    │
//! │  │ SessionId=b → Session (detached)│────┼──► timeout → removed
//! │  │ SessionId=c → Session (attached)│    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::scheduler::Scheduler;
use crate::session::{OpenHandler, Session, SessionOptions};

// ============================================================================
// SessionRegistry
// ============================================================================

/// Concurrent map of live sessions.
///
/// # Example
///
/// ```ignore
/// let registry = SessionRegistry::new(scheduler, SessionOptions::default())?;
/// let session = registry.create(Arc::new(|session| session.write("hi")))?;
///
/// // Later, from another transport request:
/// let session = registry.get(session.id())?;
/// ```
pub struct SessionRegistry {
    /// Timer service shared by every session.
    scheduler: Arc<dyn Scheduler>,
    /// Options applied to every new session.
    options: SessionOptions,
    /// Live sessions by ID.
    sessions: RwLock<FxHashMap<SessionId, Session>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("options", &self.options)
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionRegistry - Constructor
// ============================================================================

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns the error of [`SessionOptions::validate`] for invalid options.
    pub fn new(scheduler: Arc<dyn Scheduler>, options: SessionOptions) -> Result<Arc<Self>> {
        options.validate()?;
        Ok(Arc::new(Self {
            scheduler,
            options,
            sessions: RwLock::new(FxHashMap::default()),
        }))
    }
}

// ============================================================================
// SessionRegistry - Public API
// ============================================================================

impl SessionRegistry {
    /// Creates and registers a session with a generated ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the session cannot be built.
    pub fn create(self: &Arc<Self>, on_open: OpenHandler) -> Result<Session> {
        let registry: Weak<Self> = Arc::downgrade(self);

        let session = Session::builder(Arc::clone(&self.scheduler))
            .options(self.options.clone())
            .on_open(move |session| on_open(session))
            .on_timeout(move |id| {
                if let Some(registry) = registry.upgrade()
                    && registry.sessions.write().remove(&id).is_some()
                {
                    debug!(session_id = %id, "Expired session removed from registry");
                }
            })
            .build()?;

        let count = {
            let mut sessions = self.sessions.write();
            sessions.insert(session.id(), session.clone());
            sessions.len()
        };

        debug!(session_id = %session.id(), count, "Session registered");

        Ok(session)
    }

    /// Looks up a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no live session has this ID.
    pub fn get(&self, session_id: SessionId) -> Result<Session> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    /// Returns `true` if a live session has this ID.
    #[inline]
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.read().contains_key(&session_id)
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no session is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

// ============================================================================
// SessionRegistry - Lifecycle
// ============================================================================

impl SessionRegistry {
    /// Removes a session and destroys it.
    ///
    /// Returns the removed session, or `None` if it was not registered.
    pub fn remove(&self, session_id: SessionId) -> Option<Session> {
        let removed = self.sessions.write().remove(&session_id);

        if let Some(session) = &removed {
            session.destroy();
            debug!(session_id = %session_id, "Session removed from registry");
        }

        removed
    }

    /// Destroys every session.
    pub fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.write();
            map.drain().collect()
        };

        info!(count = sessions.len(), "Session registry shutting down");

        for (_, session) in sessions {
            session.destroy();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use crate::scheduler::ManualScheduler;
    use crate::session::TransportAttachment;
    use crate::session::testing::RecordingAttachment;

    fn registry() -> (Arc<ManualScheduler>, Arc<SessionRegistry>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let options = SessionOptions::new()
            .with_heartbeat_period(Duration::from_secs(25))
            .with_timeout(Duration::from_secs(5));
        let registry = SessionRegistry::new(scheduler.clone(), options).expect("registry");
        (scheduler, registry)
    }

    fn noop() -> OpenHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let scheduler = Arc::new(ManualScheduler::new());
        let options = SessionOptions::new().with_max_queue_chars(0);
        assert_err!(SessionRegistry::new(scheduler, options));
    }

    #[test]
    fn test_create_and_get() {
        let (_, registry) = registry();
        let session = registry.create(noop()).expect("create");

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(session.id()));
        let found = assert_ok!(registry.get(session.id()));
        assert_eq!(found.id(), session.id());
    }

    #[test]
    fn test_get_missing_session() {
        let (_, registry) = registry();
        let result = registry.get(SessionId::generate());
        assert!(matches!(result, Err(Error::SessionNotFound { .. })));
    }

    #[test]
    fn test_create_uses_open_handler() {
        let (_, registry) = registry();
        let session = registry
            .create(Arc::new(|session: Session| session.write("welcome")))
            .expect("create");

        let recording = RecordingAttachment::new();
        session.register(recording.clone());

        assert_eq!(recording.frames(), vec!["o", r#"a["welcome"]"#]);
    }

    #[test]
    fn test_remove_destroys_session() {
        let (scheduler, registry) = registry();
        let session = registry.create(noop()).expect("create");

        let removed = registry.remove(session.id()).expect("removed");
        assert!(removed.is_terminated());
        assert!(registry.is_empty());
        assert_eq!(scheduler.active_count(), 0);
        assert!(registry.remove(session.id()).is_none());
    }

    #[test]
    fn test_expired_session_leaves_registry() {
        let (scheduler, registry) = registry();
        let session = registry.create(noop()).expect("create");
        let attachment: Arc<dyn TransportAttachment> = RecordingAttachment::new();

        session.register(attachment.clone());
        session.detach(&attachment);
        scheduler.advance(Duration::from_secs(4));
        assert!(registry.contains(session.id()));

        scheduler.advance(Duration::from_secs(1));
        assert!(!registry.contains(session.id()));
        assert!(session.is_terminated());
    }

    #[test]
    fn test_shutdown_destroys_all() {
        let (scheduler, registry) = registry();
        let first = registry.create(noop()).expect("create");
        let second = registry.create(noop()).expect("create");
        let recording = RecordingAttachment::new();
        first.register(recording.clone());

        registry.shutdown();

        assert!(registry.is_empty());
        assert!(first.is_terminated());
        assert!(second.is_terminated());
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(recording.frames(), vec!["o", r#"c[3000,"Go away!"]"#]);
    }
}
