// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry accounting.

use super::prelude::*;

#[tokio::test(start_paused = true)]
async fn retry_once_then_give_up_leaves_the_message_in_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default());
    let queue = d.create_queue("q").unwrap();
    let worker = d.create_worker("w", WorkerOptions::default()).unwrap();

    let count = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&count);
    let callback = Callback::function(move |_ctx| {
        let seen = Arc::clone(&seen);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Err("always broken".into())
        }
    });
    let options = JobOptions::default().retry(1).retry_after(2_000);
    worker.create_job("j", "q", callback, options).unwrap();

    let message = queue.add_message(json!({"a": 1})).unwrap();

    // First attempt fails quickly.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(queue.fails_len(), 1);

    // Second attempt lands retry_after later, then the job gives up.
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);

    let fails = queue.fails();
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].id, message.id);
    assert_eq!(fails[0].failed_count, 1);
    assert_eq!(worker.instance_count("j"), Some(0));

    // The failed message stays available for operator inspection.
    let envelope = queue.get_fail(message.id).unwrap().unwrap();
    assert_eq!(envelope.value, json!({"a": 1}));
    assert_eq!(queue.fails_len(), 0);
}
