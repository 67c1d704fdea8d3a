// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enqueue happy path and validation.

use super::prelude::*;
use std::sync::Mutex;

#[tokio::test(start_paused = true)]
async fn happy_path_message_is_consumed_and_cleaned_up() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default());
    let queue = d.create_queue("q").unwrap();
    let worker = d.create_worker("w", WorkerOptions::default().priority(1)).unwrap();

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

    let message = queue.add_message(json!("hi")).unwrap();
    assert_eq!(queue.pipeline_len(), 1);

    // Callback runs once with the plaintext value.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!("hi")]);

    // Done is a deferred deletion: pipeline drains and the payload file
    // disappears about a second later.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(queue.pipeline_len(), 0);
    assert!(queue.fails().is_empty());
    assert!(!queue.has_payload(message.id));
}

#[tokio::test(start_paused = true)]
async fn oversized_messages_are_rejected_without_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default().size(5));
    let queue = d.create_queue("q").unwrap();
    let worker = d.create_worker("w", WorkerOptions::default()).unwrap();
    let (callback, count) = counting_callback();
    worker.create_job("j", "q", callback, JobOptions::default()).unwrap();

    let err = queue.add_message(json!("Hello, World!")).unwrap_err();
    assert!(matches!(err, BbqError::MessageTooLarge { size: 13, max: 5 }));
    assert_eq!(queue.pipeline_len(), 0);

    // No payload file was written and no broadcast reached the job.
    assert_eq!(std::fs::read_dir(queue.path().join("msgs")).unwrap().count(), 0);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn encrypted_queues_store_ciphertext_but_deliver_plaintext() {
    let tmp = tempfile::tempdir().unwrap();
    let d = dispatcher(tmp.path(), QueueOptions::default().secret_key("hush"));
    let queue = d.create_queue("q").unwrap();
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
    worker.create_job("j", "q", callback, JobOptions::default()).unwrap();

    let message = queue.add_message(json!({"card": "4111"})).unwrap();
    let body = std::fs::read_to_string(queue.path().join(&message.path)).unwrap();
    assert_ne!(body, r#"{"card":"4111"}"#);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"card": "4111"})]);
}
