use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::codec::file_extension;
use super::state::RecordingState;

/// Metadata for one appended chunk
#[derive(Debug, Clone, Serialize)]
pub struct ChunkInfo {
    /// Position in emission order (0-indexed)
    pub index: usize,
    pub size: usize,
    pub received_at: DateTime<Utc>,
    /// Artifact length after this chunk
    pub total_bytes: usize,
}

/// Statistics about the current recording
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: RecordingState,
    pub mime_type: String,
    pub started_at: DateTime<Utc>,
    pub chunks_count: usize,
    pub total_bytes: usize,
}

/// Chunks accumulated by one recording, in arrival order
#[derive(Debug)]
pub struct RecordingSession {
    mime_type: String,
    started_at: DateTime<Utc>,
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl RecordingSession {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            started_at: Utc::now(),
            chunks: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn append(&mut self, chunk: Vec<u8>) -> Option<ChunkInfo> {
        if chunk.is_empty() {
            return None;
        }

        let info = ChunkInfo {
            index: self.chunks.len(),
            size: chunk.len(),
            received_at: Utc::now(),
            total_bytes: self.total_bytes + chunk.len(),
        };
        self.total_bytes = info.total_bytes;
        self.chunks.push(chunk);
        debug!(
            "Chunk {} appended: {} bytes (total {})",
            info.index, info.size, info.total_bytes
        );
        Some(info)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn stats(&self, state: RecordingState) -> SessionStats {
        SessionStats {
            state,
            mime_type: self.mime_type.clone(),
            started_at: self.started_at,
            chunks_count: self.chunks.len(),
            total_bytes: self.total_bytes,
        }
    }

    /// Concatenate all chunks in arrival order
    pub fn finalize(self) -> Artifact {
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            bytes.extend_from_slice(chunk);
        }
        Artifact {
            bytes: Arc::new(bytes),
            mime_type: self.mime_type,
            chunk_count: self.chunks.len(),
            created_at: Utc::now(),
        }
    }
}

/// A finalized recording
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Arc<Vec<u8>>,
    mime_type: String,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn file_extension(&self) -> &'static str {
        file_extension(&self.mime_type)
    }

    /// True if both handles refer to the same finalized blob
    pub fn same_blob(&self, other: &Artifact) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunks_are_ignored() {
        let mut session = RecordingSession::new("video/webm");
        assert!(session.append(Vec::new()).is_none());
        assert_eq!(session.chunk_count(), 0);
    }

    #[test]
    fn test_finalize_concatenates_in_order() {
        let mut session = RecordingSession::new("video/webm;codecs=vp9");
        let first = session.append(b"abc".to_vec()).unwrap();
        let second = session.append(b"de".to_vec()).unwrap();
        assert_eq!((first.index, first.total_bytes), (0, 3));
        assert_eq!((second.index, second.total_bytes), (1, 5));

        let stats = session.stats(RecordingState::Recording);
        assert_eq!(stats.chunks_count, 2);
        assert_eq!(stats.total_bytes, 5);

        let artifact = session.finalize();
        assert_eq!(artifact.bytes(), b"abcde");
        assert_eq!(artifact.chunk_count(), 2);
        assert_eq!(artifact.mime_type(), "video/webm;codecs=vp9");
        assert_eq!(artifact.file_extension(), "webm");
    }

    #[test]
    fn test_artifact_clones_share_blob() {
        let artifact = RecordingSession::new("video/mp4").finalize();
        assert!(artifact.is_empty());
        assert!(artifact.same_blob(&artifact.clone()));
    }
}
