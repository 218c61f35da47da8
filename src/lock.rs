//! Advisory lock guarding the artifact pair across processes.
//!
//! Readers hold a shared lock while loading both files; writers hold an exclusive lock
//! while committing them, so a loader never observes one new file and one old one.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{DociaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held lock on `<storage_dir>/docia.lock`; released on drop.
#[derive(Debug)]
pub struct IndexLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl IndexLock {
    pub fn shared(path: &Path) -> Result<Self> {
        Self::acquire(path, LockMode::Shared)
    }

    pub fn exclusive(path: &Path) -> Result<Self> {
        Self::acquire(path, LockMode::Exclusive)
    }

    /// Take the exclusive lock only if nobody else holds the file.
    pub fn try_exclusive(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
                mode: LockMode::Exclusive,
            })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(lock_error(path, &err)),
        }
    }

    fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let file = open_lock_file(path)?;
        let locked = match mode {
            LockMode::Shared => file.lock_shared(),
            LockMode::Exclusive => file.lock_exclusive(),
        };
        locked.map_err(|err| lock_error(path, &err))?;
        tracing::trace!(path = %path.display(), ?mode, "acquired index lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release index lock");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| lock_error(path, &err))
}

fn lock_error(path: &Path, err: &std::io::Error) -> DociaError {
    DociaError::Lock {
        reason: format!("{}: {err}", path.display()),
    }
}
