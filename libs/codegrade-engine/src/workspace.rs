/// Workspace Manager - one scratch directory per execution request
///
/// Every request gets `<scratch_root>/cg-<uuid>`. The returned `Workspace`
/// is a drop guard: if the owner never calls `release` (error return,
/// timeout, panic, task cancellation) the directory is removed on drop.
/// Cleanup failures are logged and counted, never returned.

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

const WORKSPACE_PREFIX: &str = "cg-";

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace directory
    pub async fn acquire(&self) -> EngineResult<Workspace> {
        let id = Uuid::new_v4();
        let path = self.root.join(format!("{}{}", WORKSPACE_PREFIX, id.simple()));

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| EngineError::Workspace {
                root: self.root.clone(),
                source,
            })?;
        // create_dir (not _all) so a collision is an error instead of sharing
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| EngineError::Workspace {
                root: self.root.clone(),
                source,
            })?;

        debug!(workspace = %path.display(), "Workspace acquired");
        Ok(Workspace {
            path,
            released: false,
        })
    }

    /// Remove workspaces older than `max_age`. Backstop for directories a
    /// crashed process never got to clean up.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Failed to scan scratch root");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    debug!(workspace = %entry.path().display(), age_secs = age.as_secs(), "Swept stale workspace");
                }
                Err(e) => {
                    metrics::WORKSPACE_CLEANUP_FAILURES.inc();
                    warn!(workspace = %entry.path().display(), error = %e, "Failed to sweep stale workspace");
                }
            }
        }

        removed
    }
}

/// An allocated workspace directory, removed when released or dropped
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file into the workspace
    pub async fn write_file(&self, name: &str, contents: &str) -> EngineResult<PathBuf> {
        let path = self.path.join(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| EngineError::SourceWrite {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Recursively delete the workspace
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            report_cleanup_failure(&self.path, &e);
        } else {
            debug!(workspace = %self.path.display(), "Workspace released");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Cannot be async here; removal is synchronous and best-effort
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            report_cleanup_failure(&self.path, &e);
        } else {
            debug!(workspace = %self.path.display(), "Workspace removed on drop");
        }
    }
}

fn report_cleanup_failure(path: &Path, error: &io::Error) {
    if error.kind() == io::ErrorKind::NotFound {
        return;
    }
    metrics::WORKSPACE_CLEANUP_FAILURES.inc();
    warn!(workspace = %path.display(), error = %error, "Failed to remove workspace");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(root: &Path) -> usize {
        match std::fs::read_dir(root) {
            Ok(dir) => dir.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn test_acquire_creates_unique_directories() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path().join("nested"));

        let a = manager.acquire().await.unwrap();
        let b = manager.acquire().await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert!(a.path().starts_with(manager.root()));
        assert_eq!(entries(manager.root()), 2);
    }

    #[tokio::test]
    async fn test_release_removes_files_and_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let workspace = manager.acquire().await.unwrap();
        workspace.write_file("solution.c", "int main(){}").await.unwrap();
        let path = workspace.path().to_path_buf();

        workspace.release().await;

        assert!(!path.exists());
        assert_eq!(entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let path = {
            let workspace = manager.acquire().await.unwrap();
            workspace.write_file("a.txt", "x").await.unwrap();
            workspace.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_on_panic_removes_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());
        let root = scratch.path().to_path_buf();

        let handle = tokio::spawn(async move {
            let _workspace = manager.acquire().await.unwrap();
            panic!("request blew up");
        });

        assert!(handle.await.is_err());
        assert_eq!(entries(&root), 0);
    }

    #[tokio::test]
    async fn test_release_after_external_delete_is_quiet() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let workspace = manager.acquire().await.unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        workspace.release().await;
    }

    #[tokio::test]
    async fn test_sweep_stale_only_touches_workspaces() {
        let scratch = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let workspace = manager.acquire().await.unwrap();
        let stale_path = workspace.path().to_path_buf();
        // leak it the way a crashed worker would
        std::mem::forget(workspace);
        std::fs::create_dir(scratch.path().join("unrelated")).unwrap();

        // nothing is older than an hour
        assert_eq!(manager.sweep_stale(Duration::from_secs(3600)).await, 0);
        assert!(stale_path.exists());

        assert_eq!(manager.sweep_stale(Duration::ZERO).await, 1);
        assert!(!stale_path.exists());
        assert!(scratch.path().join("unrelated").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_root() {
        let manager = WorkspaceManager::new("/nonexistent/codegrade-scratch");
        assert_eq!(manager.sweep_stale(Duration::ZERO).await, 0);
    }
}
