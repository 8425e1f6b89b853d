//! Open data-source handles and their release.

use spatialcheck_core::{DataAccessError, DataSource, Target, TargetOpener};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Releases resources held for a target.
///
/// Releasing is idempotent: releasing a target that holds nothing is a no-op.
pub trait ResourceCleanup: Send + Sync {
    /// Releases everything held for `target`.
    fn release_target(&self, target: &Target);

    /// Releases everything held for any of `targets`.
    fn sweep(&self, targets: &[Target]) {
        for target in targets {
            self.release_target(target);
        }
    }
}

/// Caches one open data source per target path.
pub struct DataSourcePool {
    opener: Arc<dyn TargetOpener>,
    open: Mutex<HashMap<PathBuf, Arc<dyn DataSource>>>,
}

impl fmt::Debug for DataSourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourcePool")
            .field("open_count", &self.open_count())
            .finish()
    }
}

impl DataSourcePool {
    pub fn new(opener: Arc<dyn TargetOpener>) -> Self {
        Self {
            opener,
            open: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<dyn DataSource>>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the open data source of `target`, opening it on first use.
    pub async fn acquire(&self, target: &Target) -> Result<Arc<dyn DataSource>, DataAccessError> {
        let cached = self.handles().get(target.path()).cloned();
        if let Some(data_source) = cached {
            return Ok(data_source);
        }

        let opened = self.opener.open(target).await?;
        debug!(target = %target, "data source opened");
        let data_source = self
            .handles()
            .entry(target.path().to_path_buf())
            .or_insert(opened)
            .clone();
        Ok(data_source)
    }

    /// Drops the handle of `target`; returns true if one was open.
    pub fn release(&self, target: &Target) -> bool {
        self.handles().remove(target.path()).is_some()
    }

    /// Drops every handle.
    pub fn clear(&self) {
        self.handles().clear();
    }

    /// Number of open handles.
    pub fn open_count(&self) -> usize {
        self.handles().len()
    }
}

impl ResourceCleanup for DataSourcePool {
    fn release_target(&self, target: &Target) {
        if self.release(target) {
            debug!(target = %target, "data source released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatialcheck_memory::{MemoryCatalog, MemoryDataSource};

    fn catalog() -> Arc<MemoryCatalog> {
        Arc::new(
            MemoryCatalog::new()
                .with_source("/data/a.gdb", MemoryDataSource::new("a"))
                .with_broken("/data/b.gdb", "locked"),
        )
    }

    #[tokio::test]
    async fn test_acquire_reuses_handle() {
        let catalog = catalog();
        let pool = DataSourcePool::new(catalog.clone());
        let target = Target::new("/data/a.gdb");

        let first = pool.acquire(&target).await.unwrap();
        let second = pool.acquire(&target).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(catalog.open_count(), 1);
        assert_eq!(pool.open_count(), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let pool = DataSourcePool::new(catalog());
        let target = Target::new("/data/a.gdb");
        pool.acquire(&target).await.unwrap();

        assert!(pool.release(&target));
        assert!(!pool.release(&target));
        pool.release_target(&target);
        assert_eq!(pool.open_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_open_holds_nothing() {
        let pool = DataSourcePool::new(catalog());
        let err = pool.acquire(&Target::new("/data/b.gdb")).await.err().unwrap();
        assert!(matches!(err, DataAccessError::OpenFailed { .. }));
        assert!(matches!(
            pool.acquire(&Target::new("/data/c.gdb")).await,
            Err(DataAccessError::TargetNotFound(_))
        ));
        assert_eq!(pool.open_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_and_clear() {
        let pool = DataSourcePool::new(catalog());
        let target = Target::new("/data/a.gdb");
        pool.acquire(&target).await.unwrap();
        pool.sweep(&[target.clone(), Target::new("/data/b.gdb")]);
        assert_eq!(pool.open_count(), 0);

        pool.acquire(&target).await.unwrap();
        pool.clear();
        assert_eq!(pool.open_count(), 0);
    }
}
