//! Call state snapshots for external durability
//!
//! The gateway hands a snapshot to the store on every station update and
//! when a call ends. Storage itself lives outside this crate; the in-memory
//! store is the default.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use call_assist_core::CallState;
use parking_lot::RwLock;

use crate::ServerError;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, call_id: &str, state: &CallState) -> Result<(), ServerError>;

    async fn load(&self, call_id: &str) -> Result<Option<CallState>, ServerError>;

    async fn delete(&self, call_id: &str) -> Result<(), ServerError>;

    async fn list_ids(&self) -> Result<Vec<String>, ServerError>;
}

/// Keeps the newest snapshot per call
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, CallState>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, call_id: &str, state: &CallState) -> Result<(), ServerError> {
        let mut snapshots = self.snapshots.write();
        // Saves are spawned, so an older one may land late
        if let Some(existing) = snapshots.get(call_id) {
            if existing.updated_at > state.updated_at {
                return Ok(());
            }
        }
        snapshots.insert(call_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, call_id: &str) -> Result<Option<CallState>, ServerError> {
        Ok(self.snapshots.read().get(call_id).cloned())
    }

    async fn delete(&self, call_id: &str) -> Result<(), ServerError> {
        self.snapshots.write().remove(call_id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, ServerError> {
        Ok(self.snapshots.read().keys().cloned().collect())
    }
}

/// Save in the background; failures are logged
pub fn spawn_save(store: Arc<dyn SnapshotStore>, state: CallState) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(call_id = %state.call_id, "No runtime, snapshot not saved");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = store.save(&state.call_id, &state).await {
            tracing::warn!(call_id = %state.call_id, error = %e, "Failed to save snapshot");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySnapshotStore::new();
        let state = CallState::new("call-1", None);

        store.save("call-1", &state).await.unwrap();
        assert_eq!(store.load("call-1").await.unwrap(), Some(state.clone()));
        assert_eq!(store.list_ids().await.unwrap(), vec!["call-1".to_string()]);

        store.delete("call-1").await.unwrap();
        assert!(store.load("call-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_older_snapshot_does_not_overwrite() {
        let store = InMemorySnapshotStore::new();
        let mut newer = CallState::new("call-1", None);
        newer.updated_at = newer.updated_at + Duration::seconds(5);
        newer.segment_confidence = 80;
        let older = CallState::new("call-1", None);

        store.save("call-1", &newer).await.unwrap();
        store.save("call-1", &older).await.unwrap();
        assert_eq!(
            store.load("call-1").await.unwrap().unwrap().segment_confidence,
            80
        );
    }
}
