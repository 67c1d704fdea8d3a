// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state survives a process restart.

use super::prelude::*;
use std::sync::Mutex;

#[tokio::test(start_paused = true)]
async fn setup_restores_the_pipeline_with_payloads() {
    let tmp = tempfile::tempdir().unwrap();

    let ids: Vec<_> = {
        let d = dispatcher(tmp.path(), QueueOptions::default());
        let queue = d.create_queue("q").unwrap();
        let ids = ["one", "two", "three"]
            .into_iter()
            .map(|name| queue.add_message(json!(name)).unwrap().id)
            .collect();
        // Let the debounced snapshot land, then "terminate" the process.
        tokio::time::sleep(Duration::from_secs(4)).await;
        d.shutdown();
        ids
    };

    let restored = dispatcher(tmp.path(), QueueOptions::default());
    let queue = restored.get_queue("q").unwrap();

    let pipeline = queue.pipeline();
    assert_eq!(pipeline.iter().map(|m| m.id).collect::<Vec<_>>(), ids);
    assert!(pipeline.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    for message in &pipeline {
        assert!(queue.has_payload(message.id));
    }
}

#[tokio::test(start_paused = true)]
async fn rebroadcast_resumes_work_in_creation_order_without_duplicates() {
    let tmp = tempfile::tempdir().unwrap();
    // A long rebroadcast delay keeps the setup wave (which finds no worker)
    // out of the picture; the operator-requested wave below is what lands.
    let options = QueueOptions::default().rebroadcast_time(600_000);

    {
        let d = dispatcher(tmp.path(), options.clone());
        let queue = d.create_queue("q").unwrap();
        for name in ["one", "two", "three"] {
            queue.add_message(json!(name)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(4)).await;
        d.shutdown();
    }

    let restored = dispatcher(tmp.path(), options);
    let queue = restored.get_queue("q").unwrap();
    assert_eq!(queue.pipeline_len(), 3);

    let worker = restored.create_worker("w", WorkerOptions::default()).unwrap();
    let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = Callback::function(move |ctx| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(ctx.message.value.clone());
            Ok(())
        }
    });
    worker.create_job("j", "q", callback, JobOptions::default()).unwrap();

    queue.rebroadcast(true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!("one"), json!("two"), json!("three")]);
}

#[tokio::test(start_paused = true)]
async fn late_workers_are_reached_by_the_delayed_wave() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let d = dispatcher(tmp.path(), QueueOptions::default());
        let queue = d.create_queue("q").unwrap();
        for name in ["one", "two", "three"] {
            queue.add_message(json!(name)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(4)).await;
        d.shutdown();
    }

    // Default rebroadcast delay: the setup wave finds no worker and re-arms
    // itself; the wave lands on the job registered afterwards.
    let restored = dispatcher(tmp.path(), QueueOptions::default());
    let worker = restored.create_worker("w", WorkerOptions::default()).unwrap();
    let (callback, count) = counting_callback();
    worker.create_job("j", "q", callback, JobOptions::default()).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn restored_expiration_timers_count_from_the_original_creation() {
    let tmp = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();

    {
        let config = DispatcherConfig::default()
            .path(tmp.path().join("bbq"))
            .queue(QueueOptions::default().expire(60));
        let d = Dispatcher::with_clock(config, clock.clone());
        d.setup().unwrap();
        let queue = d.create_queue("q").unwrap();
        queue.add_message(json!("short-lived")).unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        d.shutdown();
    }

    // 50 of the 60 seconds elapse while the process is down.
    clock.advance(Duration::from_secs(50));

    let config = DispatcherConfig::default()
        .path(tmp.path().join("bbq"))
        .queue(QueueOptions::default().expire(60));
    let restored = Dispatcher::with_clock(config, clock);
    restored.setup().unwrap();
    let queue = restored.get_queue("q").unwrap();
    assert_eq!(queue.pipeline_len(), 1);

    // Only the remaining ten seconds are left on the timer.
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(queue.pipeline_len(), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.pipeline_len(), 0);
}
