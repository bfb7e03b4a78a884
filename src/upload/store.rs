use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

/// Metadata row written after the object upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecording {
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub duration_seconds: Option<u64>,
    pub public_url: String,
    pub user_id: String,
    pub is_public: bool,
}

/// Identifiers assigned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecording {
    pub id: Uuid,
    pub share_token: String,
}

/// Cloud storage plus the recordings table
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Id of the signed-in user, if any
    async fn current_user(&self) -> Result<Option<String>, StoreError>;

    async fn put_object(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;

    fn public_url(&self, path: &str) -> String;

    async fn insert_record(&self, record: NewRecording) -> Result<StoredRecording, StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct RecordingRow {
    pub id: Uuid,
    pub share_token: String,
    pub created_at: DateTime<Utc>,
    pub record: NewRecording,
}

#[derive(Debug, Default)]
struct MemoryState {
    user: Option<String>,
    objects: HashMap<String, StoredObject>,
    rows: Vec<RecordingRow>,
    fail_writes: bool,
}

/// In-process store for local use and tests
#[derive(Debug)]
pub struct MemoryStore {
    base_url: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.state.lock().user = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        self.state.lock().user = None;
    }

    /// Make object writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.state.lock().objects.get(path).cloned()
    }

    pub fn rows(&self) -> Vec<RecordingRow> {
        self.state.lock().rows.clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn current_user(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().user.clone())
    }

    async fn put_object(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(StoreError("bucket unavailable".to_string()));
        }
        state.objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/recordings/{}", self.base_url, path)
    }

    async fn insert_record(&self, record: NewRecording) -> Result<StoredRecording, StoreError> {
        let stored = StoredRecording {
            id: Uuid::new_v4(),
            share_token: Uuid::new_v4().simple().to_string(),
        };
        self.state.lock().rows.push(RecordingRow {
            id: stored.id,
            share_token: stored.share_token.clone(),
            created_at: Utc::now(),
            record,
        });
        Ok(stored)
    }
}
