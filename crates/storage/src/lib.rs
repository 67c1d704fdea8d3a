// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bbq-storage: durable-state primitives for the BBQ job queue.
//!
//! Payload files, the at-rest cipher, and the metadata snapshot records
//! live here. The engine crate decides *when* to persist; this crate only
//! knows *how*.

pub mod crypto;
pub mod meta;
pub mod payload;

pub use crypto::{CryptoError, PayloadCipher};
pub use meta::{
    read_dispatcher_meta, read_queue_meta, write_dispatcher_meta, write_queue_meta,
    DispatcherMeta, QueueDescriptor, QueueMeta, DISPATCHER_META_FILE, QUEUE_META_FILE,
};
pub use payload::{PayloadStore, MSGS_DIR, PAYLOAD_EXT};

use thiserror::Error;

/// Errors surfaced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
