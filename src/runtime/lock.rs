//! Cross-process advisory file locks.

use anyhow::{Context, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::RealRuntime;

/// Guard for an exclusive lock on a lock file. The lock is released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// A guard that holds no lock. Used by runtimes without a real filesystem.
    pub fn unlocked(path: impl Into<PathBuf>) -> Self {
        Self {
            file: None,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = file.unlock()
        {
            debug!("Failed to unlock {:?}: {}", self.path, e);
        }
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn lock_exclusive_impl(&self, path: &Path) -> Result<FileLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {:?}", path))?;
        file.lock()
            .with_context(|| format!("Failed to lock {:?}", path))?;
        debug!("Acquired lock {:?}", path);
        Ok(FileLock {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_lock_creates_file_and_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let lock = RealRuntime.lock_exclusive(&path).unwrap();
        assert!(lock.is_held());
        assert_eq!(lock.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn test_unlocked_guard() {
        let lock = FileLock::unlocked("/tmp/.lock");
        assert!(!lock.is_held());
    }

    #[test]
    fn test_lock_serializes_holders() {
        let dir = tempdir().unwrap();
        let path = Arc::new(dir.path().join(".lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = Arc::clone(&path);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    // Each thread opens its own handle, like separate processes would
                    let _lock = RealRuntime.lock_exclusive(&path).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
