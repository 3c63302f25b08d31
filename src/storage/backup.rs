//! File-based backups of the repository
//!
//! Each backup is two files in the data directory: `<id>.backup`, an
//! lz4-compressed JSON snapshot of every collection, and `<id>.meta.json`,
//! a small JSON metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use uuid::Uuid;

use super::repository::{Repository, RepositorySnapshot};

const SCHEMA_VERSION: u32 = 1;
const DATA_SUFFIX: &str = ".backup";
const META_SUFFIX: &str = ".meta.json";
const TMP_SUFFIX: &str = ".tmp";

/// Key-value byte storage used by the backup manager
pub trait BackupBackend: Send + Sync {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), BackupError>;

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackupError>;

    fn delete(&self, key: &str) -> Result<(), BackupError>;

    fn list_keys(&self) -> Result<Vec<String>, BackupError>;
}

/// Stores each key as the file `<data_dir>/<key>`
pub struct FileBackend {
    data_dir: PathBuf,
}

impl FileBackend {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, BackupError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(key)
    }
}

impl BackupBackend for FileBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), BackupError> {
        // Temp file + rename: readers never observe a partially written key
        let tmp = self.data_dir.join(format!("{}{}", key, TMP_SUFFIX));
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.key_path(key))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BackupError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn delete(&self, key: &str) -> Result<(), BackupError> {
        let path = self.key_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, BackupError> {
        let mut keys = Vec::new();

        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TMP_SUFFIX) {
                    keys.push(name.to_string());
                }
            }
        }

        Ok(keys)
    }
}

/// Metadata describing one backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metric_count: usize,
    pub execution_count: usize,
    pub archive_count: usize,
    /// Uncompressed snapshot size
    pub size_bytes: usize,
    pub compressed_bytes: usize,
    pub schema_version: u32,
}

/// Creates, lists, restores and prunes repository backups
pub struct BackupManager {
    backend: Box<dyn BackupBackend>,
}

impl BackupManager {
    /// Manager storing backups under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, BackupError> {
        Ok(Self::with_backend(Box::new(FileBackend::new(data_dir)?)))
    }

    pub fn with_backend(backend: Box<dyn BackupBackend>) -> Self {
        Self { backend }
    }

    /// Snapshot the repository into a new backup
    pub fn create(
        &self,
        repository: &Repository,
        label: Option<String>,
    ) -> Result<BackupMetadata, BackupError> {
        let now = Utc::now();
        let id = format!(
            "backup_{}_{}",
            now.timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let snapshot = repository.snapshot();
        let raw = serde_json::to_vec(&snapshot)
            .map_err(|e| BackupError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&raw);

        let metadata = BackupMetadata {
            id: id.clone(),
            label,
            created_at: now,
            metric_count: snapshot.metrics.len(),
            execution_count: snapshot.executions.len(),
            archive_count: snapshot.archives.len(),
            size_bytes: raw.len(),
            compressed_bytes: compressed.len(),
            schema_version: SCHEMA_VERSION,
        };
        let metadata_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| BackupError::Serialization(e.to_string()))?;

        // Data first so a listed backup always has its payload
        self.backend.write(&data_key(&id), &compressed)?;
        self.backend.write(&meta_key(&id), &metadata_bytes)?;

        tracing::info!(
            backup_id = %id,
            metrics = metadata.metric_count,
            executions = metadata.execution_count,
            archives = metadata.archive_count,
            compressed_bytes = metadata.compressed_bytes,
            "Backup created"
        );

        Ok(metadata)
    }

    /// All backups, newest first
    pub fn list(&self) -> Result<Vec<BackupMetadata>, BackupError> {
        let mut backups = Vec::new();

        for key in self.backend.list_keys()? {
            let Some(id) = key.strip_suffix(META_SUFFIX) else {
                continue;
            };
            match self.get(id) {
                Ok(metadata) => backups.push(metadata),
                Err(e) => tracing::warn!(backup_id = %id, error = %e, "Skipping unreadable backup"),
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(backups)
    }

    pub fn get(&self, id: &str) -> Result<BackupMetadata, BackupError> {
        check_id(id)?;
        let data = self
            .backend
            .read(&meta_key(id))?
            .ok_or_else(|| BackupError::NotFound(id.to_string()))?;

        serde_json::from_slice(&data).map_err(|e| BackupError::Corrupted(e.to_string()))
    }

    /// Replace the repository contents with the backup's snapshot
    pub fn restore(&self, repository: &Repository, id: &str) -> Result<BackupMetadata, BackupError> {
        let metadata = self.get(id)?;
        if metadata.schema_version != SCHEMA_VERSION {
            return Err(BackupError::Corrupted(format!(
                "unsupported schema version {}",
                metadata.schema_version
            )));
        }

        let compressed = self
            .backend
            .read(&data_key(id))?
            .ok_or_else(|| BackupError::Corrupted(format!("backup {} has no data file", id)))?;
        let raw = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| BackupError::Corrupted(e.to_string()))?;
        let snapshot: RepositorySnapshot =
            serde_json::from_slice(&raw).map_err(|e| BackupError::Corrupted(e.to_string()))?;

        repository.replace_from(snapshot);
        tracing::info!(backup_id = %id, "Backup restored");

        Ok(metadata)
    }

    pub fn delete(&self, id: &str) -> Result<(), BackupError> {
        // Ensures the backup exists and the id is well-formed
        self.get(id)?;
        self.backend.delete(&meta_key(id))?;
        self.backend.delete(&data_key(id))?;
        tracing::info!(backup_id = %id, "Backup deleted");
        Ok(())
    }

    /// Delete all but the `keep` most recent backups. Returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, BackupError> {
        let backups = self.list()?;
        let mut deleted = 0;

        for backup in backups.iter().skip(keep) {
            self.delete(&backup.id)?;
            deleted += 1;
        }

        Ok(deleted)
    }
}

fn meta_key(id: &str) -> String {
    format!("{}{}", id, META_SUFFIX)
}

fn data_key(id: &str) -> String {
    format!("{}{}", id, DATA_SUFFIX)
}

/// Ids become file names; anything outside `[A-Za-z0-9_-]` cannot name a backup
fn check_id(id: &str) -> Result<(), BackupError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BackupError::NotFound(id.to_string()))
    }
}

/// Periodically creates a backup and prunes old ones
pub struct BackupWorker {
    manager: Arc<BackupManager>,
    repository: Arc<Repository>,
    interval: Duration,
    keep: usize,
    running: Arc<AtomicBool>,
}

impl BackupWorker {
    pub fn new(
        manager: Arc<BackupManager>,
        repository: Arc<Repository>,
        interval: Duration,
        keep: usize,
    ) -> Self {
        Self {
            manager,
            repository,
            interval,
            keep,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Backup worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            // The first tick fires immediately; skip it so startup doesn't write a backup
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                let result = self
                    .manager
                    .create(&self.repository, Some("scheduled".to_string()))
                    .and_then(|_| self.manager.prune(self.keep));

                match result {
                    Ok(pruned) if pruned > 0 => {
                        tracing::info!("Backup worker pruned {} old backups", pruned)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Scheduled backup failed"),
                }
            }

            tracing::info!("Backup worker stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Corrupted backup: {0}")]
    Corrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NewExecution, NewMetric};
    use tempfile::TempDir;

    fn populated_repo() -> Repository {
        let repo = Repository::new();
        let now = Utc::now();
        repo.insert_metric(
            NewMetric::new("deal", "d-1", "pipeline.value", 1200.0)
                .into_metric(now)
                .unwrap(),
        );
        repo.insert_execution(NewExecution::new("sync", "Sync").into_execution(now).unwrap());
        repo
    }

    #[test]
    fn test_create_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::open(temp_dir.path()).unwrap();
        let repo = populated_repo();

        let metadata = manager.create(&repo, Some("before-migration".into())).unwrap();
        assert_eq!(metadata.metric_count, 1);
        assert_eq!(metadata.execution_count, 1);
        assert!(metadata.compressed_bytes > 0);

        let restored = Repository::new();
        manager.restore(&restored, &metadata.id).unwrap();
        assert_eq!(restored.stats(), repo.stats());
    }

    #[test]
    fn test_list_newest_first_and_prune() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::open(temp_dir.path()).unwrap();
        let repo = populated_repo();

        for _ in 0..3 {
            manager.create(&repo, None).unwrap();
        }

        let backups = manager.list().unwrap();
        assert_eq!(backups.len(), 3);
        assert!(backups[0].created_at >= backups[2].created_at);

        let pruned = manager.prune(1).unwrap();
        assert_eq!(pruned, 2);
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::open(temp_dir.path()).unwrap();
        let metadata = manager.create(&populated_repo(), None).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"unrelated").unwrap();

        let mut files: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name != "notes.txt")
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                format!("{}.backup", metadata.id),
                format!("{}.meta.json", metadata.id)
            ]
        );

        let meta_path = temp_dir.path().join(format!("{}.meta.json", metadata.id));
        let meta: BackupMetadata = serde_json::from_slice(&std::fs::read(meta_path).unwrap()).unwrap();
        assert_eq!(meta, metadata);
        assert_eq!(manager.list().unwrap(), vec![metadata.clone()]);

        manager.delete(&metadata.id).unwrap();
        assert!(!temp_dir.path().join(format!("{}.backup", metadata.id)).exists());
        assert!(temp_dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_unknown_and_malformed_ids() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::open(temp_dir.path()).unwrap();

        assert!(matches!(manager.get("backup_missing"), Err(BackupError::NotFound(_))));
        assert!(matches!(manager.get("../etc/passwd"), Err(BackupError::NotFound(_))));
        assert!(matches!(manager.delete("backup_missing"), Err(BackupError::NotFound(_))));
    }

    #[test]
    fn test_corrupted_data_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::open(temp_dir.path()).unwrap();
        let metadata = manager.create(&populated_repo(), None).unwrap();

        let data_path = temp_dir.path().join(format!("{}.backup", metadata.id));
        std::fs::write(&data_path, [4u8, 0, 0, 0, 0xFF]).unwrap();

        let result = manager.restore(&Repository::new(), &metadata.id);
        assert!(matches!(result, Err(BackupError::Corrupted(_))));
    }
}
