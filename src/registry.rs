//! Process-wide store of active sessions.

use crate::media::SessionId;
use crate::recorder::controller::SessionEvent;
use crate::recorder::state::SessionState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

/// Handle to a live session task: its serialized event queue plus a
/// read-only view of its state.
#[derive(Clone)]
pub struct SessionHandle {
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub state: watch::Receiver<SessionState>,
    pub created_at: DateTime<Utc>,
}

/// Concurrent map of session id to live handle. All cross-session access
/// goes through this store; sessions share no other mutable state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns false when the id is already present.
    pub fn insert(&self, id: SessionId, handle: SessionHandle) -> bool {
        match self.sessions.write().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SessionHandle {
        let (events, _rx) = mpsc::unbounded_channel();
        let (_state_tx, state) = watch::channel(SessionState::Connecting);
        SessionHandle {
            events,
            state,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let registry = SessionRegistry::new();
        let id = SessionId::new("abc");
        assert!(registry.insert(id.clone(), handle()));
        assert!(!registry.insert(id.clone(), handle()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_frees_the_id() {
        let registry = SessionRegistry::new();
        let id = SessionId::new("abc");
        registry.insert(id.clone(), handle());
        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
        assert!(registry.insert(id, handle()));
    }
}
