// src/store/backend.rs

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

/// 持久化失败
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize campaign document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage quota exceeded: document is {size} bytes, quota is {quota} bytes")]
    QuotaExceeded { size: usize, quota: usize },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// 持久化键值存储
///
/// 整个广告配置以一个 JSON 文档存放在固定的 key 下。
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn save(&self, key: &str, document: &str) -> Result<(), StorageError>;
}

/// 基于目录的存储：每个 key 对应 `<dir>/<key>.json`
pub struct FileBackend {
    pub dir: PathBuf,
    pub quota_bytes: Option<usize>,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, document: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            if document.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    size: document.len(),
                    quota,
                });
            }
        }
        fs::create_dir_all(&self.dir).await?;
        // 先写临时文件再 rename，避免进程中断留下半个文档
        let target = self.path_for(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, document).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

/// 内存存储，用于测试与本地演示；可以注入写失败
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(key: &str, document: &str) -> Self {
        let backend = Self::default();
        backend.lock().insert(key.to_string(), document.to_string());
        backend
    }

    /// 之后的写操作全部失败，直到再次调用并传入 `false`
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn document(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.document(key))
    }

    async fn save(&self, key: &str, document: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory backend rejected write".into()));
        }
        self.lock().insert(key.to_string(), document.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backend_round_trips_and_reports_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert!(backend.load("ad_campaigns").await.unwrap().is_none());

        backend.save("ad_campaigns", r#"{"footer":{}}"#).await.unwrap();
        assert_eq!(
            backend.load("ad_campaigns").await.unwrap().as_deref(),
            Some(r#"{"footer":{}}"#)
        );
        assert!(!dir.path().join("ad_campaigns.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_backend_enforces_quota() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).with_quota(Some(8));
        let err = backend.save("ad_campaigns", "0123456789").await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { size: 10, quota: 8 }));
        assert!(backend.load("ad_campaigns").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_backend_can_fail_writes() {
        let backend = MemoryBackend::new();
        backend.fail_writes(true);
        assert!(backend.save("k", "v").await.is_err());
        backend.fail_writes(false);
        backend.save("k", "v").await.unwrap();
        assert_eq!(backend.write_count(), 1);
    }
}
