// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine tests.

use crate::callback::{Callback, JobContext};
use crate::dispatcher::Dispatcher;
use bbq_core::{DispatcherConfig, FakeClock, QueueOptions};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Dispatcher on a fake clock rooted in a temp directory.
pub(crate) fn dispatcher(root: &Path) -> Dispatcher<FakeClock> {
    dispatcher_with(root, QueueOptions::default())
}

pub(crate) fn dispatcher_with(root: &Path, queue: QueueOptions) -> Dispatcher<FakeClock> {
    let config = DispatcherConfig::default().path(root.join("bbq")).queue(queue);
    let d = Dispatcher::with_clock(config, FakeClock::new());
    d.setup().expect("dispatcher setup");
    d
}

/// Queue options with a rebroadcast delay far beyond any test horizon, so
/// unrouted broadcasts stay quiet.
pub(crate) fn quiet_options() -> QueueOptions {
    QueueOptions::default().rebroadcast_time(600_000)
}

/// Callback that counts invocations and succeeds.
pub(crate) fn counting_callback() -> (Callback, Arc<AtomicU32>) {
    let count = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&count);
    let callback = Callback::function(move |_ctx: JobContext| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (callback, count)
}

/// Callback that counts invocations and always fails.
pub(crate) fn failing_callback() -> (Callback, Arc<AtomicU32>) {
    let count = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&count);
    let callback = Callback::function(move |_ctx: JobContext| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Err("boom".into())
        }
    });
    (callback, count)
}

/// Callback that records which job handled each value, then sleeps.
pub(crate) fn recording_callback(
    hold: Duration,
) -> (Callback, Arc<Mutex<Vec<(String, serde_json::Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = Callback::function(move |ctx: JobContext| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push((ctx.job_name.clone(), ctx.message.value.clone()));
            tokio::time::sleep(hold).await;
            Ok(())
        }
    });
    (callback, seen)
}
