//! Issuance Lock
//!
//! Only one issuance may touch the PKI root and its ledger at a time. The lock has two
//! layers: an in-process async mutex, so tasks of this process queue fairly without
//! tying up blocking threads, and an advisory `flock` on a file inside the PKI root,
//! which extends the exclusion to every process on the host using the same root.
//!
//! Both layers are held by an [`IssuanceGuard`] and released when it is dropped, on
//! every exit path.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{PkiError, Result};

pub const LOCK_FILE_NAME: &str = ".pki-issuer.lock";

#[derive(Debug, Clone)]
pub struct IssuanceLock {
    path: PathBuf,
    local: Arc<Mutex<()>>,
}

impl IssuanceLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            local: Arc::new(Mutex::new(())),
        }
    }

    /// Lock file `.pki-issuer.lock` directly under the PKI root
    pub fn for_pki_root(pki_root: &Path) -> Self {
        Self::new(pki_root.join(LOCK_FILE_NAME))
    }

    /// Wait until no other issuance holds the lock, then take it
    pub async fn acquire(&self) -> Result<IssuanceGuard> {
        let local = Arc::clone(&self.local).lock_owned().await;

        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(io::Error::other)
        .and_then(|opened| opened)
        .map_err(|source| PkiError::Lock {
            path: self.path.clone(),
            source,
        })?;

        debug!("Acquired issuance lock {}", self.path.display());
        Ok(IssuanceGuard {
            file,
            path: self.path.clone(),
            _local: local,
        })
    }
}

/// Holds the issuance lock until dropped
#[derive(Debug)]
pub struct IssuanceGuard {
    file: File,
    path: PathBuf,
    _local: OwnedMutexGuard<()>,
}

impl Drop for IssuanceGuard {
    fn drop(&mut self) {
        // `_local` is dropped after this, so the flock is gone before the next
        // in-process waiter runs.
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(
                "Failed to unlock issuance lock {}: {}",
                self.path.display(),
                e
            );
        }
        debug!("Released issuance lock {}", self.path.display());
    }
}
