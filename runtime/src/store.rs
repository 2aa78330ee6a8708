//! Participant persistence.
//!
//! The router saves the whole [`Participant`] after every completed
//! transition, so a store only needs whole-value save/load/delete.

use async_trait::async_trait;
use quire_core::{Participant, ParticipantId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stored session is corrupted: {0}")]
    Corrupted(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, participant: &Participant) -> Result<(), StoreError>;
    async fn load(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;
    async fn delete(&self, id: ParticipantId) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    data: tokio::sync::RwLock<HashMap<ParticipantId, Participant>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, participant: &Participant) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert(participant.id, participant.clone());
        Ok(())
    }

    async fn load(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.data.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: ParticipantId) -> Result<(), StoreError> {
        self.data.write().await.remove(&id);
        Ok(())
    }
}

/// One JSON file per participant. Writes go to a temporary file that is then
/// renamed over the old one, so a crash never leaves half a session behind.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: ParticipantId) -> PathBuf {
        self.dir.join(format!("{id}.session.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, participant: &Participant) -> Result<(), StoreError> {
        let path = self.path_for(participant.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(participant)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    async fn load(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(e.to_string())),
        };
        let participant = serde_json::from_slice::<Participant>(&bytes)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        Ok(Some(participant))
    }

    async fn delete(&self, id: ParticipantId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Storage(e.to_string())),
        }
    }
}
