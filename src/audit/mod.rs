//! Audit log of completed turns
//!
//! Each record carries a digest of the turn's final business snapshot so a
//! state can later be checked against what was recorded.

use crate::graph::route_after_router;
use crate::state::{ConversationState, StateSnapshot};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub session_id: Option<Uuid>,
    /// Branch taken after the router
    pub route: String,
    pub execution_path: Vec<String>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
    pub snapshot: StateSnapshot,
    pub snapshot_hash: String,
}

impl TurnRecord {
    pub fn from_state(session_id: Option<Uuid>, state: &ConversationState, elapsed: Duration) -> Self {
        let snapshot = state.snapshot();
        let snapshot_hash = compute_snapshot_hash(&snapshot);

        Self {
            turn_id: Uuid::new_v4(),
            session_id,
            route: route_after_router(state.router_response.as_deref())
                .name()
                .to_string(),
            execution_path: state.execution_path.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
            created_at: Utc::now(),
            snapshot,
            snapshot_hash,
        }
    }
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, TurnRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a turn record
    pub async fn record(&self, record: TurnRecord) -> Result<Uuid> {
        let turn_id = record.turn_id;
        let mut records = self.records.write().await;
        records.insert(turn_id, record);
        Ok(turn_id)
    }

    pub async fn get(&self, turn_id: Uuid) -> Result<Option<TurnRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&turn_id).cloned())
    }

    /// Turn ids of a session, oldest first
    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .filter(|record| record.session_id == Some(session_id))
            .map(|record| (record.turn_id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Drop every record of a session, returning how many were removed
    pub async fn remove_session(&self, session_id: Uuid) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.session_id != Some(session_id));
        Ok(before - records.len())
    }

    /// Check a stored record against its own digest
    pub async fn verify_integrity(&self, turn_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records
            .get(&turn_id)
            .map(|record| compute_snapshot_hash(&record.snapshot) == record.snapshot_hash)
            .unwrap_or(false))
    }

    /// Whether `state` is the final state recorded for `turn_id`
    pub async fn matches_state(&self, turn_id: Uuid, state: &ConversationState) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records
            .get(&turn_id)
            .map(|record| compute_snapshot_hash(&state.snapshot()) == record.snapshot_hash)
            .unwrap_or(false))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 hex digest of a snapshot's JSON form, streamed into the hasher
pub fn compute_snapshot_hash(snapshot: &StateSnapshot) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), snapshot).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
