// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine's public error surface.

use bbq_core::CronError;
use bbq_storage::StorageError;
use thiserror::Error;

/// Errors raised by queue, worker, and dispatcher operations.
///
/// Validation errors (`QueueFull`, `MessageUndefined`, `MessageTooLarge`)
/// reject the offending call before anything is persisted. Callback
/// failures are absorbed into the queue's fails list and never surface
/// here; `CallbackFailed` and `Timeout` only describe individual attempts
/// in logs and retry accounting.
#[derive(Debug, Error)]
pub enum BbqError {
    #[error("queue is full (limit {limit})")]
    QueueFull { limit: usize },
    #[error("message value is undefined")]
    MessageUndefined,
    #[error("message of {size} bytes exceeds the queue cap of {max}")]
    MessageTooLarge { size: u64, max: u64 },
    #[error("queue not found: {0}")]
    QueueNotFound(String),
    #[error("name already registered: {0}")]
    NameDuplicate(String),
    #[error("invalid callback: {0}")]
    CallbackInvalid(String),
    #[error("callback failed: {0}")]
    CallbackFailed(String),
    #[error("callback timed out after {0} ms")]
    Timeout(u64),
    #[error("worker runtime error: {0}")]
    WorkerRuntime(String),
    #[error(transparent)]
    Cron(#[from] CronError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
