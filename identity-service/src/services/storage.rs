//! Object storage for user-uploaded assets. The identity core only ever deletes.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Remove each path, file or folder. Paths that do not exist are skipped.
    async fn delete(&self, paths: &[String]) -> Result<(), anyhow::Error>;
}

pub struct NoneStorage;

#[async_trait]
impl StorageProvider for NoneStorage {
    async fn delete(&self, paths: &[String]) -> Result<(), anyhow::Error> {
        tracing::debug!(count = paths.len(), "Storage provider disabled, skipping delete");
        Ok(())
    }
}

/// Files under a root directory. Missing files count as deleted.
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, anyhow::Error> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("Refusing to delete path outside storage root: {}", path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageProvider for DiskStorage {
    async fn delete(&self, paths: &[String]) -> Result<(), anyhow::Error> {
        for path in paths {
            let full = self.resolve(path)?;
            let removed = match tokio::fs::metadata(&full).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&full).await,
                Ok(_) => tokio::fs::remove_file(&full).await,
                Err(e) => Err(e),
            };
            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow::anyhow!("Failed to delete {}: {}", full.display(), e))
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockStorage {
    deleted: Mutex<Vec<String>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StorageProvider for MockStorage {
    async fn delete(&self, paths: &[String]) -> Result<(), anyhow::Error> {
        self.deleted
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock storage mutex poisoned: {}", e))?
            .extend(paths.iter().cloned());
        Ok(())
    }
}
