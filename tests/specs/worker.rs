// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Back-pressure under saturated jobs.

use super::prelude::*;
use std::sync::Mutex;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn saturated_job_defers_the_second_message_until_the_first_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default().rebroadcast_time(500));
    let queue = d.create_queue("q").unwrap();
    let worker = d.create_worker("w", WorkerOptions::default()).unwrap();

    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&spans);
    let callback = Callback::function(move |_ctx| {
        let sink = Arc::clone(&sink);
        async move {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_secs(5)).await;
            sink.lock().unwrap().push((started, Instant::now()));
            Ok(())
        }
    });
    let options = JobOptions::default().concurrency(1).working_message_count(1);
    worker.create_job("slow", "q", callback, options).unwrap();

    queue.add_message(json!("first")).unwrap();
    queue.add_message(json!("second")).unwrap();

    // Only one instance fits; the second message waits for rebroadcast and
    // a freed slot.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(worker.instance_count("slow"), Some(1));

    tokio::time::sleep(Duration::from_secs(15)).await;
    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 2, "both messages handled");
    let (_, first_end) = spans[0];
    let (second_start, _) = spans[1];
    assert!(second_start >= first_end, "attempts never overlapped");
    assert_eq!(queue.pipeline_len(), 0);
    assert!(queue.fails().is_empty());
}
