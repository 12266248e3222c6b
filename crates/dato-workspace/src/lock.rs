//! Cross-process workspace initialization lock.
//!
//! Directory creation is the lock primitive: `create_dir` is atomic on
//! every platform we care about, so whoever creates `<root>.lock` owns the
//! initialization. A `meta.json` with the owner pid and timestamp makes
//! stale locks from crashed processes detectable; anything older than the
//! acquisition timeout is broken and reclaimed.

use chrono::{DateTime, Utc};
use dato_mcp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long acquisition retries before giving up; also the staleness
/// horizon for abandoned locks.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Delay between acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize, Deserialize)]
struct LockMeta {
    pid: u32,
    created_at: DateTime<Utc>,
}

/// An acquired lock; dropping it releases the lock directory.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "failed to release workspace lock");
        }
    }
}

/// Acquires the initialization lock for `workspace_root`.
///
/// # Errors
///
/// Returns [`Error::Timeout`] when the lock cannot be acquired within
/// [`LOCK_TIMEOUT`], and [`Error::Io`] on unexpected filesystem failures.
pub async fn acquire(workspace_root: &Path) -> Result<LockGuard> {
    let lock_path = lock_path(workspace_root);
    if let Some(parent) = lock_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }

    let deadline = tokio::time::Instant::now() + LOCK_TIMEOUT;
    loop {
        match tokio::fs::create_dir(&lock_path).await {
            Ok(()) => {
                let meta = LockMeta {
                    pid: std::process::id(),
                    created_at: Utc::now(),
                };
                let serialized = serde_json::to_vec(&meta)?;
                tokio::fs::write(lock_path.join("meta.json"), serialized)
                    .await
                    .map_err(|e| Error::io("writing lock metadata", e))?;
                tracing::debug!(path = %lock_path.display(), "workspace lock acquired");
                return Ok(LockGuard { path: lock_path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if is_stale(&lock_path).await {
                    tracing::warn!(path = %lock_path.display(), "breaking stale workspace lock");
                    let _ = tokio::fs::remove_dir_all(&lock_path).await;
                    continue;
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(Error::Timeout {
                        operation: format!("acquiring workspace lock {}", lock_path.display()),
                        duration_secs: LOCK_TIMEOUT.as_secs(),
                    });
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(Error::io(
                    format!("creating lock directory {}", lock_path.display()),
                    e,
                ))
            }
        }
    }
}

fn lock_path(workspace_root: &Path) -> PathBuf {
    let mut name = workspace_root
        .file_name()
        .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());
    name.push_str(".lock");
    workspace_root.with_file_name(name)
}

/// A lock is stale when its metadata timestamp (or, failing that, the
/// directory mtime) is older than [`LOCK_TIMEOUT`].
async fn is_stale(lock_path: &Path) -> bool {
    let meta_file = lock_path.join("meta.json");
    if let Ok(raw) = tokio::fs::read(&meta_file).await {
        if let Ok(meta) = serde_json::from_slice::<LockMeta>(&raw) {
            let age = Utc::now().signed_duration_since(meta.created_at);
            return age.num_seconds() >= i64::try_from(LOCK_TIMEOUT.as_secs()).unwrap_or(i64::MAX);
        }
    }
    // Unreadable metadata: fall back to the directory's own mtime. A lock
    // directory whose owner died between create_dir and the metadata write
    // stays empty forever; the mtime check reclaims it.
    match tokio::fs::metadata(lock_path).await {
        Ok(metadata) => metadata
            .modified()
            .ok()
            .and_then(|mtime| mtime.elapsed().ok())
            .is_some_and(|age| age >= LOCK_TIMEOUT),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("workspace");

        let guard = acquire(&root).await.unwrap();
        assert!(lock_path(&root).exists());
        drop(guard);
        assert!(!lock_path(&root).exists());
    }

    #[tokio::test]
    async fn test_reacquire_after_release() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("workspace");

        drop(acquire(&root).await.unwrap());
        let second = acquire(&root).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("workspace");
        let lock = lock_path(&root);

        // Simulate a crashed owner: a lock with an ancient timestamp.
        std::fs::create_dir_all(&lock).unwrap();
        let meta = LockMeta {
            pid: 1,
            created_at: Utc::now() - chrono::Duration::hours(1),
        };
        std::fs::write(lock.join("meta.json"), serde_json::to_vec(&meta).unwrap()).unwrap();

        let guard = acquire(&root).await;
        assert!(guard.is_ok(), "stale lock must be reclaimed");
    }

    #[tokio::test]
    async fn test_fresh_lock_blocks_until_timeout() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("workspace");

        let _guard = acquire(&root).await.unwrap();

        // A second acquisition cannot finish while the guard is held; give
        // it a bounded slice of time and expect it to still be pending.
        let pending = tokio::time::timeout(Duration::from_millis(600), acquire(&root)).await;
        assert!(pending.is_err(), "second acquire must still be waiting");
    }
}
