//! File-based backend — one directory per session.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<session_id>/_index.json   metadata + key counter
//! <base>/<session_id>/<key>.txt     one blob per key
//! ```
//!
//! The index is loaded lazily per session and flushed to disk on every
//! mutation, so a crashed process loses at most the write in flight.
//! Blobs are plain text files, human-inspectable with `cat`.

use crate::{EntrySummary, ScratchpadEntry, ScratchpadStore, generated_key};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use turnstone_core::{ScratchpadError, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRow {
    key: String,
    description: String,
    size_chars: usize,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionIndex {
    rows: Vec<IndexRow>,
    counter: u64,
}

/// A file-backed scratchpad rooted at a base directory.
pub struct FileScratchpad {
    base_dir: PathBuf,
    indexes: Arc<RwLock<HashMap<SessionId, SessionIndex>>>,
}

impl FileScratchpad {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            indexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.base_dir.join(session_id.to_string())
    }

    fn blob_path(&self, session_id: &SessionId, key: &str) -> PathBuf {
        self.session_dir(session_id).join(format!("{key}.txt"))
    }

    fn index_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("_index.json")
    }

    fn load_index(path: &Path) -> SessionIndex {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return SessionIndex::default(), // No index yet, start empty
        };
        match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupted scratchpad index, starting fresh");
                SessionIndex::default()
            }
        }
    }

    fn flush_index(&self, session_id: &SessionId, index: &SessionIndex) -> Result<(), ScratchpadError> {
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| ScratchpadError::Storage(e.to_string()))?;
        std::fs::write(self.index_path(session_id), json)
            .map_err(|e| ScratchpadError::Storage(e.to_string()))
    }

    /// Ensure the session's index is cached, loading it from disk once.
    async fn ensure_loaded(&self, session_id: &SessionId) {
        {
            let indexes = self.indexes.read().await;
            if indexes.contains_key(session_id) {
                return;
            }
        }
        let loaded = Self::load_index(&self.index_path(session_id));
        debug!(session = %session_id, entries = loaded.rows.len(), "Loaded scratchpad index");
        self.indexes.write().await.entry(session_id.clone()).or_insert(loaded);
    }
}

#[async_trait]
impl ScratchpadStore for FileScratchpad {
    fn name(&self) -> &str {
        "file"
    }

    async fn put(
        &self,
        session_id: &SessionId,
        key: Option<&str>,
        content: &str,
        description: &str,
        domain: &str,
    ) -> Result<String, ScratchpadError> {
        self.ensure_loaded(session_id).await;
        std::fs::create_dir_all(self.session_dir(session_id))
            .map_err(|e| ScratchpadError::Storage(e.to_string()))?;

        let mut indexes = self.indexes.write().await;
        let index = indexes.entry(session_id.clone()).or_default();

        let key = match key {
            Some(k) => k.to_string(),
            None => {
                index.counter += 1;
                generated_key(domain, index.counter)
            }
        };

        std::fs::write(self.blob_path(session_id, &key), content)
            .map_err(|e| ScratchpadError::Storage(e.to_string()))?;

        let row = IndexRow {
            key: key.clone(),
            description: description.to_string(),
            size_chars: content.chars().count(),
            created_at: Utc::now(),
        };
        match index.rows.iter_mut().find(|r| r.key == key) {
            Some(existing) => *existing = row,
            None => index.rows.push(row),
        }
        self.flush_index(session_id, index)?;
        Ok(key)
    }

    async fn get(&self, session_id: &SessionId, key: &str) -> Result<String, ScratchpadError> {
        self.ensure_loaded(session_id).await;
        let indexes = self.indexes.read().await;
        let known = indexes
            .get(session_id)
            .map(|i| i.rows.iter().any(|r| r.key == key))
            .unwrap_or(false);
        if !known {
            return Err(ScratchpadError::NotFound {
                key: key.to_string(),
            });
        }
        std::fs::read_to_string(self.blob_path(session_id, key)).map_err(|_| {
            ScratchpadError::NotFound {
                key: key.to_string(),
            }
        })
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<EntrySummary>, ScratchpadError> {
        self.ensure_loaded(session_id).await;
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(session_id) else {
            return Ok(Vec::new());
        };
        let mut summaries = Vec::with_capacity(index.rows.len());
        for row in &index.rows {
            let content = std::fs::read_to_string(self.blob_path(session_id, &row.key))
                .unwrap_or_default();
            let entry = ScratchpadEntry {
                key: row.key.clone(),
                description: row.description.clone(),
                size_chars: row.size_chars,
                created_at: row.created_at,
                content,
            };
            summaries.push(EntrySummary::from(&entry));
        }
        Ok(summaries)
    }

    async fn search(
        &self,
        session_id: &SessionId,
        query: &str,
    ) -> Result<Vec<String>, ScratchpadError> {
        self.ensure_loaded(session_id).await;
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(session_id) else {
            return Ok(Vec::new());
        };
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();
        for row in &index.rows {
            let content = std::fs::read_to_string(self.blob_path(session_id, &row.key))
                .unwrap_or_default();
            if content.to_lowercase().contains(&query_lower)
                || row.description.to_lowercase().contains(&query_lower)
            {
                hits.push(row.key.clone());
            }
        }
        Ok(hits)
    }

    async fn purge(&self, session_id: &SessionId) -> Result<(), ScratchpadError> {
        self.indexes.write().await.remove(session_id);
        let dir = self.session_dir(session_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| ScratchpadError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}
