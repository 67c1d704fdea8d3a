// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Option records for queues, jobs, schedules, workers, and the dispatcher.
//!
//! These are plain structs with explicit defaults so unknown keys cannot
//! leak in. All durations are milliseconds unless the field says otherwise.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum debounce window for queue metadata snapshots.
pub const UPDATE_META_TIME_FLOOR_MS: u64 = 1_000;

/// At-rest payload format when a secret key is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretMode {
    /// AES-256-ECB, hex encoded. Deterministic; kept for compatibility with
    /// payload files written by earlier releases.
    #[default]
    Legacy,
    /// AES-256-GCM with a random nonce prefixed to the hex ciphertext.
    /// Payloads written under the legacy format remain readable.
    Authenticated,
}

crate::simple_display! {
    SecretMode {
        Legacy => "legacy",
        Authenticated => "authenticated",
    }
}

/// Per-queue behavior knobs.
///
/// The secret key and mode are deliberately skipped during serialization:
/// metadata snapshots record only whether a key is configured, and restored
/// queues re-apply the key from the dispatcher defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueOptions {
    /// Maximum canonical payload size in bytes.
    pub size: u64,
    /// Per-message lifetime in seconds; 0 disables expiration.
    pub expire: u64,
    /// Pipeline length cap; 0 disables the cap.
    pub limit: usize,
    /// Debounce window for metadata snapshots, clamped to
    /// [`UPDATE_META_TIME_FLOOR_MS`].
    pub update_meta_time: u64,
    /// Delay before a message is re-emitted under back-pressure.
    pub rebroadcast_time: u64,
    #[serde(skip)]
    pub secret_key: String,
    #[serde(skip)]
    pub secret_mode: SecretMode,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            size: 2_048,
            expire: 0,
            limit: 0,
            update_meta_time: 3_000,
            rebroadcast_time: 2_000,
            secret_key: String::new(),
            secret_mode: SecretMode::Legacy,
        }
    }
}

impl QueueOptions {
    crate::setters! {
        into {
            secret_key: String,
        }
        set {
            size: u64,
            expire: u64,
            limit: usize,
            update_meta_time: u64,
            rebroadcast_time: u64,
            secret_mode: SecretMode,
        }
    }

    /// Debounce window with the floor applied.
    pub fn effective_update_meta_time(&self) -> u64 {
        self.update_meta_time.max(UPDATE_META_TIME_FLOOR_MS)
    }

    /// True when payloads are encrypted at rest.
    pub fn is_secret(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

/// Per-job behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub log: bool,
    /// Additional attempts after the first (`retry + 1` attempts total).
    pub retry: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout: u64,
    /// Delay between a failed attempt and its retry.
    pub retry_after: u64,
    /// Advisory cap on listeners attached per external runtime. Carried for
    /// option-record compatibility; the scheduler does not consult it.
    pub max_listeners: u32,
    /// Live instances allowed per job.
    pub concurrency: usize,
    /// Accepted-but-not-started messages allowed per job.
    pub working_message_count: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            log: false,
            retry: 0,
            timeout: 60_000,
            retry_after: 30_000,
            max_listeners: 100,
            concurrency: 20,
            working_message_count: 100,
        }
    }
}

impl JobOptions {
    crate::setters! {
        set {
            log: bool,
            retry: u32,
            timeout: u64,
            retry_after: u64,
            max_listeners: u32,
            concurrency: usize,
            working_message_count: usize,
        }
    }
}

/// Schedule-job knobs: job knobs plus the timezone cron patterns match in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleOptions {
    pub timezone: TimezoneOption,
    pub job: JobOptions,
}

impl ScheduleOptions {
    crate::setters! {
        set {
            job: JobOptions,
        }
    }

    pub fn timezone(mut self, tz: Tz) -> Self {
        self.timezone = TimezoneOption(tz);
        self
    }

    pub fn tz(&self) -> Tz {
        self.timezone.0
    }
}

/// Newtype so `ScheduleOptions` can default to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneOption(pub Tz);

impl Default for TimezoneOption {
    fn default() -> Self {
        Self(Tz::UTC)
    }
}

/// Per-worker behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerOptions {
    pub log: bool,
    /// Routing precedence; higher matches earlier. Ties keep insertion order.
    pub priority: i32,
    /// Period of the legacy interval dispatch loop.
    pub interval_run_job: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { log: false, priority: 1, interval_run_job: 2_000 }
    }
}

impl WorkerOptions {
    crate::setters! {
        set {
            log: bool,
            priority: i32,
            interval_run_job: u64,
        }
    }
}

/// Top-level dispatcher configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Root directory for persisted state.
    pub path: PathBuf,
    pub log: bool,
    /// Defaults applied to queues created without explicit options.
    pub queue: QueueOptions,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("bbq"), log: false, queue: QueueOptions::default() }
    }
}

impl DispatcherConfig {
    crate::setters! {
        into {
            path: PathBuf,
        }
        set {
            log: bool,
            queue: QueueOptions,
        }
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
