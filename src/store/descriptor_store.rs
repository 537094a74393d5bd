use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::model::{entry_name, DescriptorFile};

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> ResolveResult<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.{}", file_name, uuid::Uuid::new_v4()));

    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| ResolveError::io(&temp, e))?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(ResolveError::io(path, e));
    }
    Ok(())
}

/// Exclusive access to one path; the map entry goes away with its last holder.
struct PathLock<'a> {
    store: &'a DescriptorStore,
    path: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.store.locks.lock();
        // one reference in the map, one here
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.path);
        }
    }
}

/// Serialised read-modify-write access to descriptor files and workspace resources.
///
/// Every mutation of a path runs under that path's async lock, so concurrent
/// writers to the same descriptor file cannot lose each other's updates.
#[derive(Debug)]
pub struct DescriptorStore {
    workspace: Arc<Workspace>,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl DescriptorStore {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self {
            workspace,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Hold `path`'s lock until the returned guard is dropped.
    async fn acquire(&self, path: &Path) -> PathLock<'_> {
        let lock = self
            .locks
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        PathLock {
            store: self,
            path: path.to_path_buf(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn locked_paths(&self) -> usize {
        self.locks.lock().len()
    }

    async fn load(&self, path: &Path) -> ResolveResult<DescriptorFile> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResolveError::BadRequest {
                    path: path.parent().unwrap_or(path).to_path_buf(),
                    reason: "has no descriptor file".to_string(),
                })
            }
            Err(e) => return Err(ResolveError::io(path, e)),
        };
        DescriptorFile::parse(&text, path)
    }

    async fn save(&self, path: &Path, file: &DescriptorFile) -> ResolveResult<()> {
        let text = serde_json::to_string_pretty(file)
            .map_err(|e| ResolveError::Internal(format!("descriptor serialisation: {e}")))?;
        write_atomic(path, text.as_bytes()).await
    }

    /// Insert or replace the entry `name` in the descriptor file of `dir`.
    pub async fn upsert_operation(&self, dir: &Path, name: &str, mut entry: Value) -> ResolveResult<()> {
        let path = self.workspace.descriptor_path(dir);
        let Some(object) = entry.as_object_mut() else {
            return Err(ResolveError::BadRequest {
                path: dir.join(name),
                reason: "operation body must be a JSON object".to_string(),
            });
        };
        object.insert("name".to_string(), Value::String(name.to_string()));

        let _lock = self.acquire(&path).await;

        let mut file = self.load(&path).await?;
        let meta = file.meta.get_or_insert_with(Vec::new);
        meta.retain(|existing| entry_name(existing) != Some(name));
        meta.push(entry);
        self.save(&path, &file).await?;

        info!("Stored operation '{}' in {}", name, path.display());
        Ok(())
    }

    /// Remove the entry `name`; `false` if it was not declared.
    pub async fn remove_operation(&self, dir: &Path, name: &str) -> ResolveResult<bool> {
        let path = self.workspace.descriptor_path(dir);
        let _lock = self.acquire(&path).await;

        let mut file = self.load(&path).await?;
        let Some(meta) = file.meta.as_mut() else {
            return Err(ResolveError::BadRequest {
                path: dir.join(name),
                reason: "has no operations defined".to_string(),
            });
        };
        let before = meta.len();
        meta.retain(|existing| entry_name(existing) != Some(name));
        if meta.len() == before {
            return Ok(false);
        }
        self.save(&path, &file).await?;

        info!("Removed operation '{}' from {}", name, path.display());
        Ok(true)
    }

    /// Create or overwrite a plain resource file, creating parent directories.
    pub async fn write_resource(&self, path: &Path, body: &[u8]) -> ResolveResult<()> {
        if self.workspace.is_descriptor(path) {
            return Err(ResolveError::BadRequest {
                path: path.to_path_buf(),
                reason: "descriptor files are managed through operations".to_string(),
            });
        }
        if path.is_dir() {
            return Err(ResolveError::BadRequest {
                path: path.to_path_buf(),
                reason: "is a directory".to_string(),
            });
        }

        let _lock = self.acquire(path).await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ResolveError::io(parent, e))?;
        }
        write_atomic(path, body).await?;
        debug!("Wrote {} bytes to {}", body.len(), path.display());
        Ok(())
    }

    /// Delete a file or a whole directory; `false` if nothing was there.
    pub async fn delete_resource(&self, path: &Path) -> ResolveResult<bool> {
        if path == self.workspace.root() {
            return Err(ResolveError::BadRequest {
                path: path.to_path_buf(),
                reason: "the workspace root cannot be deleted".to_string(),
            });
        }

        let _lock = self.acquire(path).await;

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(ResolveError::io(path, e)),
        };
        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        removed.map_err(|e| ResolveError::io(path, e))?;

        info!("Deleted {}", path.display());
        Ok(true)
    }
}
