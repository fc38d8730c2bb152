//! Snapshot/recovery contract for engine state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Opaque, versioned engine state. The engine owns the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlob {
    pub version: u32,
    pub bytes: Vec<u8>,
}

impl StateBlob {
    pub fn new(version: u32, bytes: Vec<u8>) -> Self {
        Self { version, bytes }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, instance_id: &str, blob: &StateBlob) -> anyhow::Result<()>;

    /// `Ok(None)` when nothing has been saved for `instance_id` yet.
    async fn load(&self, instance_id: &str) -> anyhow::Result<Option<StateBlob>>;
}

/// Process-local store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    blobs: RwLock<HashMap<String, StateBlob>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, instance_id: &str, blob: &StateBlob) -> anyhow::Result<()> {
        self.blobs
            .write()
            .await
            .insert(instance_id.to_string(), blob.clone());
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> anyhow::Result<Option<StateBlob>> {
        Ok(self.blobs.read().await.get(instance_id).cloned())
    }
}
