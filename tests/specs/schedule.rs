// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron-triggered jobs.

use super::prelude::*;
use std::sync::Mutex;

#[tokio::test(start_paused = true)]
async fn minutely_schedule_fires_one_instance_per_minute() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default());
    let worker = d.create_worker("w", WorkerOptions::default()).unwrap();

    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = Callback::function(move |ctx| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(ctx.message.value.clone());
            Ok(())
        }
    });
    worker
        .create_schedule_job("tick", callback, "minutely", json!({"k": 1}), ScheduleOptions::default())
        .unwrap();

    // One minute: exactly one instance, carrying the sample payload.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"k": 1})]);
    assert_eq!(worker.instance_count("tick"), Some(0));

    // Another minute: a second instance fires.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}
