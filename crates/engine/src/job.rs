// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One job's descriptor and the per-instance execution loop.
//!
//! An instance takes one message through up to `retry + 1` attempts. Each
//! attempt races the callback against the timeout; failures route the
//! message to the queue's fails list before the retry delay.

use crate::callback::{Callback, JobContext};
use crate::error::BbqError;
use crate::queue::Queue;
use crate::runtime;
use crate::worker::{InstanceKind, Worker};
use bbq_core::{Clock, JobOptions, MessageEnvelope};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

/// A job registered on a worker: callback, options, and live accounting.
pub(crate) struct JobEntry<C: Clock> {
    pub(crate) name: String,
    pub(crate) queue: Arc<Queue<C>>,
    pub(crate) callback: Callback,
    pub(crate) options: JobOptions,
    pub(crate) clock: C,
    pub(crate) worker: Weak<Worker<C>>,
    pub(crate) state: Mutex<JobState>,
}

#[derive(Default)]
pub(crate) struct JobState {
    /// Live instances, capped by `concurrency`.
    pub(crate) instances: HashSet<Uuid>,
    /// Accepted-but-not-yet-started messages, capped by
    /// `working_message_count`. A message stays here until its instance
    /// begins the first attempt.
    pub(crate) working: VecDeque<MessageEnvelope>,
    /// Ids already handed to an instance that has not started yet.
    pub(crate) dispatched: HashSet<Uuid>,
}

/// Drive one message through its attempts on a fresh instance.
pub(crate) async fn run_instance<C: Clock + 'static>(
    job: Arc<JobEntry<C>>,
    instance_id: Uuid,
    envelope: MessageEnvelope,
) {
    let Some(worker) = job.worker.upgrade() else { return };
    // The message is now started: leave the working list and unpause the
    // queue observer. Retries reuse this instance and do not re-notify.
    worker.down_message(&job.name, &envelope);

    let mut tried: u32 = 0;
    loop {
        tried += 1;
        let context = JobContext {
            instance_id,
            job_name: job.name.clone(),
            worker_name: worker.name().to_string(),
            queue_name: Some(job.queue.name().to_string()),
            options: job.options.clone(),
            handle_at: job.clock.epoch_ms(),
            message: envelope.clone(),
            tried,
        };
        match execute_attempt(&job.callback, context, job.options.timeout).await {
            Ok(()) => {
                if job.options.log {
                    tracing::info!(job = %job.name, message = %envelope.message.id, tried, "message handled");
                }
                worker.down_instance(&job.name, instance_id, InstanceKind::Job);
                job.queue.done(envelope.message.id);
                return;
            }
            Err(error) => {
                tracing::warn!(job = %job.name, message = %envelope.message.id, tried, error = %error, "attempt failed");
                job.queue.fail(envelope.message.id);
                if tried < job.options.retry + 1 {
                    tokio::time::sleep(Duration::from_millis(job.options.retry_after)).await;
                    continue;
                }
                worker.down_instance(&job.name, instance_id, InstanceKind::Job);
                return;
            }
        }
    }
}

/// Run one attempt of a callback under the per-attempt timeout.
pub(crate) async fn execute_attempt(
    callback: &Callback,
    context: JobContext,
    timeout_ms: u64,
) -> Result<(), BbqError> {
    match callback {
        Callback::Function(f) => {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), f(context)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(BbqError::CallbackFailed(e.to_string())),
                Err(_) => Err(BbqError::Timeout(timeout_ms)),
            }
        }
        Callback::Module(path) => {
            runtime::run_module(path, &context, Duration::from_millis(timeout_ms)).await
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
