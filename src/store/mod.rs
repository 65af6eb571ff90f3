// src/store/mod.rs
//! Key-value persistence behind the job store.
//!
//! The job store only sees [`KvStore`], so the per-file backend can be
//! replaced by an embedded or networked store without touching the pipeline.

use crate::error::JobError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub mod job_store;

pub use job_store::JobStore;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), JobError>;
    async fn keys(&self) -> Result<Vec<String>, JobError>;
}

/// One `<key>.json` file per key under a root directory
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, JobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!("File store ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), JobError> {
        // Write-then-rename so readers never observe a half-written record
        let tmp_path = self.root.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&tmp_path, value).await?;
        tokio::fs::rename(&tmp_path, self.path_for(key)).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, JobError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }
}

/// In-process backend, used by tests and ephemeral runs
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, JobError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), JobError> {
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, JobError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
