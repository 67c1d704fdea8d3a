// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload file store: one file per message under the queue's `msgs/`
//! directory, named by the md5 of the message id.

use crate::crypto::PayloadCipher;
use crate::StorageError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Directory under a queue's path holding payload files.
pub const MSGS_DIR: &str = "msgs";

/// Extension of payload files.
pub const PAYLOAD_EXT: &str = "knmbbq";

/// Reads and writes one queue's payload files through its configured cipher.
pub struct PayloadStore {
    dir: PathBuf,
    cipher: PayloadCipher,
}

impl PayloadStore {
    pub fn new(queue_dir: &Path, cipher: PayloadCipher) -> Self {
        Self { dir: queue_dir.join(MSGS_DIR), cipher }
    }

    /// Create the payload directory if it does not exist.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// True when payloads are encrypted at rest.
    pub fn is_secret(&self) -> bool {
        self.cipher.is_secret()
    }

    /// File name of a message payload: `<md5(id)>.knmbbq`.
    pub fn file_name(id: Uuid) -> String {
        format!("{:x}.{}", md5::compute(id.to_string()), PAYLOAD_EXT)
    }

    /// Path of a message payload relative to the queue directory, the form
    /// recorded on the message itself.
    pub fn relative_path(id: Uuid) -> String {
        format!("{}/{}", MSGS_DIR, Self::file_name(id))
    }

    fn file_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    /// Seal and write a canonical payload.
    pub fn write(&self, id: Uuid, canonical: &str) -> Result<(), StorageError> {
        let body = self.cipher.seal(canonical)?;
        fs::write(self.file_path(id), body)?;
        Ok(())
    }

    /// Read and open a payload back into its canonical form.
    pub fn read(&self, id: Uuid) -> Result<String, StorageError> {
        let body = fs::read_to_string(self.file_path(id))?;
        Ok(self.cipher.open(&body)?)
    }

    /// Remove a payload file. Missing files are not an error; the deletion
    /// timer may race a `done` cleanup.
    pub fn remove(&self, id: Uuid) -> Result<(), StorageError> {
        match fs::remove_file(self.file_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.file_path(id).exists()
    }

    /// Remove payload files whose name is not in `keep`. Orphans appear
    /// when a crash lands between a payload write and the next metadata
    /// snapshot. Returns how many files were removed.
    pub fn prune(&self, keep: &HashSet<String>) -> Result<usize, StorageError> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if keep.contains(name) {
                continue;
            }
            fs::remove_file(entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
