// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the end-to-end specs.

pub use bbq_engine::{
    BbqError, Callback, Dispatcher, DispatcherConfig, FakeClock, JobOptions, QueueOptions,
    ScheduleOptions, WorkerOptions,
};
pub use serde_json::json;
pub use std::sync::atomic::{AtomicU32, Ordering};
pub use std::sync::Arc;
pub use std::time::Duration;

/// Dispatcher on a fake clock rooted in a fresh temp directory.
pub fn dispatcher(root: &std::path::Path, queue: QueueOptions) -> Dispatcher<FakeClock> {
    let config = DispatcherConfig::default().path(root.join("bbq")).queue(queue);
    let d = Dispatcher::with_clock(config, FakeClock::new());
    d.setup().expect("dispatcher setup");
    d
}

/// Callback that counts invocations and succeeds immediately.
pub fn counting_callback() -> (Callback, Arc<AtomicU32>) {
    let count = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&count);
    let callback = Callback::function(move |_ctx| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (callback, count)
}
