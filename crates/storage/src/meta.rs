// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata snapshot records and file I/O.
//!
//! Each queue snapshots its pipeline and fails into `metaq.json` inside its
//! directory; the dispatcher snapshots its queue registry into
//! `metabbq.json` at the root. Snapshots record whether a secret key is
//! configured, never the key itself. Writes go through a temp file and a
//! rename so a crash never leaves a half-written snapshot behind.

use crate::StorageError;
use bbq_core::{Message, QueueOptions};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Queue snapshot file name, fixed within each queue directory.
pub const QUEUE_META_FILE: &str = "metaq.json";

/// Dispatcher snapshot file name, fixed within the root directory.
pub const DISPATCHER_META_FILE: &str = "metabbq.json";

/// Snapshot of one queue's durable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMeta {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub size: u64,
    pub expire: u64,
    pub limit: usize,
    /// Whether a secret key is configured; the key itself is never written.
    pub secret: bool,
    pub created_at: u64,
    pub pipeline: Vec<Message>,
    pub fails: Vec<Message>,
}

/// One registered queue as recorded in the dispatcher snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDescriptor {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub options: QueueOptions,
}

/// Snapshot of the dispatcher's queue registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherMeta {
    pub queues: Vec<QueueDescriptor>,
    pub created_at: u64,
    pub path: String,
    pub secret: bool,
    pub log: bool,
}

/// Read a queue snapshot from its directory, `None` when absent.
pub fn read_queue_meta(dir: &Path) -> Result<Option<QueueMeta>, StorageError> {
    read_json(&dir.join(QUEUE_META_FILE))
}

/// Write a queue snapshot into its directory.
pub fn write_queue_meta(dir: &Path, meta: &QueueMeta) -> Result<(), StorageError> {
    write_json(&dir.join(QUEUE_META_FILE), meta)
}

/// Read the dispatcher snapshot from the root directory, `None` when absent.
pub fn read_dispatcher_meta(root: &Path) -> Result<Option<DispatcherMeta>, StorageError> {
    read_json(&root.join(DISPATCHER_META_FILE))
}

/// Write the dispatcher snapshot into the root directory.
pub fn write_dispatcher_meta(root: &Path, meta: &DispatcherMeta) -> Result<(), StorageError> {
    write_json(&root.join(DISPATCHER_META_FILE), meta)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let body = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
