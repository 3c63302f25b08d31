pub mod backup;
pub mod memory;
pub mod repository;

pub use backup::{BackupBackend, BackupError, BackupManager, BackupMetadata, BackupWorker, FileBackend};
pub use memory::{MemoryStats, MemoryTracker};
pub use repository::{Repository, RepositorySnapshot, RepositoryStats};
