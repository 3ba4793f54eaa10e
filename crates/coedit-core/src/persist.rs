//! Room-persistence boundary
//!
//! Optional mirroring of accepted code snapshots so a room survives every
//! participant leaving. The coordinator writes best-effort; a store failure
//! is logged and never affects convergence.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::convergence::CodeSnapshot;
use crate::errors::Result;
use crate::types::RoomId;

/// Contract against the snapshot store.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Persist the current snapshot for a room, replacing any prior one.
    async fn save(&self, snapshot: &CodeSnapshot) -> Result<()>;

    /// Load the last persisted snapshot for a room, if any.
    async fn load(&self, room: &RoomId) -> Result<Option<CodeSnapshot>>;
}

/// In-process store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: tokio::sync::Mutex<HashMap<RoomId, CodeSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn save(&self, snapshot: &CodeSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .await
            .insert(snapshot.room.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, room: &RoomId) -> Result<Option<CodeSnapshot>> {
        Ok(self.snapshots.lock().await.get(room).cloned())
    }
}
