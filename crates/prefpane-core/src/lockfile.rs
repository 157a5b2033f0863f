use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock held while a backup or restore touches the user
/// directory, so two processes never copy over each other.
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
    file: File,
}

impl OperationLock {
    /// Returns `None` when another process holds the lock.
    pub fn try_acquire(path: &Path, holder: &str) -> anyhow::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create lock directory")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open lock file {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0).context("truncate lock file")?;
                writeln!(file, "{holder}").context("write lock holder")?;
                debug!(path = %path.display(), holder, "Operation lock acquired");
                Ok(Some(Self {
                    path: path.to_path_buf(),
                    file,
                }))
            }
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock file exclusively"),
        }
    }

    /// Name written by the current holder, if any.
    pub fn holder(path: &Path) -> Option<String> {
        fs::read_to_string(path)
            .ok()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION on Windows.
    matches!(err.raw_os_error(), Some(33))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("run").join("operation.lock");
        let first = OperationLock::try_acquire(&lock_path, "backup").unwrap();
        assert!(first.is_some());
        assert!(OperationLock::try_acquire(&lock_path, "restore").unwrap().is_none());
        assert_eq!(OperationLock::holder(&lock_path).as_deref(), Some("backup"));
        drop(first);
        assert!(OperationLock::try_acquire(&lock_path, "restore").unwrap().is_some());
    }
}
