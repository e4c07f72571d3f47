//! Session persistence layer
//!
//! Keeps each session's last final state between turns.
//! In-memory only; state does not survive a restart.

use super::ConversationState;
use crate::models::ConversationMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Slot holding a session's last final state. Holding its lock for the
/// whole turn keeps two turns from running against the same state.
pub type SessionSlot = Arc<Mutex<Option<ConversationState>>>;

/// Exclusive access to a session's stored state for the length of a turn
pub type SessionGuard = OwnedMutexGuard<Option<ConversationState>>;

/// Trait for session storage
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Get (or create) the slot for a session
    async fn slot(&self, session_id: Uuid) -> SessionSlot;

    /// Lock the session's current slot. A slot that was cleared while
    /// waiting for the lock is abandoned for the one now in the store.
    async fn acquire(&self, session_id: Uuid) -> SessionGuard {
        loop {
            let slot = self.slot(session_id).await;
            let guard = slot.clone().lock_owned().await;

            if Arc::ptr_eq(&slot, &self.slot(session_id).await) {
                return guard;
            }
        }
    }

    /// Message history of a session, `None` if the session is unknown
    async fn messages(&self, session_id: Uuid) -> Option<Vec<ConversationMessage>>;

    /// Drop a session's state. Waits for a running turn to finish first.
    async fn clear(&self, session_id: Uuid) -> bool;
}

/// In-memory session store
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionSlot>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn slot(&self, session_id: Uuid) -> SessionSlot {
        {
            let sessions = self.sessions.read().await;
            if let Some(slot) = sessions.get(&session_id) {
                return slot.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn messages(&self, session_id: Uuid) -> Option<Vec<ConversationMessage>> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(&session_id).cloned()?
        };

        let guard = slot.lock().await;
        Some(
            guard
                .as_ref()
                .map(|state| state.messages().to_vec())
                .unwrap_or_default(),
        )
    }

    async fn clear(&self, session_id: Uuid) -> bool {
        let Some(slot) = self.sessions.read().await.get(&session_id).cloned() else {
            return false;
        };

        // Unlink only while holding the slot, so a waiting turn sees the removal
        let mut guard = slot.lock().await;
        {
            let mut sessions = self.sessions.write().await;
            if sessions
                .get(&session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
            {
                sessions.remove(&session_id);
            }
        }
        guard.take();
        true
    }
}
