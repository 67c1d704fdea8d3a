// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-triggered jobs.
//!
//! A schedule job has no queue. A one-minute tick evaluates its cron
//! pattern in the configured timezone; each match spins up an instance
//! (subject to `concurrency`) whose handle carries a synthetic message
//! cloned from the sample payload. Retry and timeout semantics match
//! ordinary jobs.

use crate::callback::{Callback, JobContext};
use crate::job;
use crate::worker::{InstanceKind, Worker};
use bbq_core::{classify, Clock, CronPattern, Message, MessageEnvelope, ScheduleOptions};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Cron evaluation period.
pub(crate) const TICK_PERIOD: Duration = Duration::from_secs(60);

/// A schedule job registered on a worker.
pub(crate) struct ScheduleEntry<C: Clock> {
    pub(crate) name: String,
    pub(crate) sample_data: Value,
    pub(crate) pattern: CronPattern,
    pub(crate) callback: Callback,
    pub(crate) options: ScheduleOptions,
    pub(crate) clock: C,
    pub(crate) worker: Weak<Worker<C>>,
    pub(crate) state: Mutex<ScheduleState>,
}

#[derive(Default)]
pub(crate) struct ScheduleState {
    pub(crate) instances: HashSet<Uuid>,
}

/// Start the tick task for one schedule job. The first evaluation happens
/// one full period after registration.
pub(crate) fn spawn_tick<C: Clock + 'static>(
    worker: &Arc<Worker<C>>,
    entry: Arc<ScheduleEntry<C>>,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(worker);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(TICK_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick.tick().await;
        loop {
            tick.tick().await;
            if weak.upgrade().is_none() {
                break;
            }
            if !entry.pattern.is_time_to_run(entry.options.tz(), entry.clock.epoch_ms()) {
                continue;
            }
            let instance_id = {
                let mut state = entry.state.lock();
                if state.instances.len() >= entry.options.job.concurrency {
                    if entry.options.job.log {
                        tracing::info!(schedule = %entry.name, "tick skipped, at concurrency");
                    }
                    continue;
                }
                let id = Uuid::new_v4();
                state.instances.insert(id);
                id
            };
            tokio::spawn(run_instance(Arc::clone(&entry), instance_id));
        }
    })
}

/// Run one triggered instance through its attempts.
pub(crate) async fn run_instance<C: Clock + 'static>(
    entry: Arc<ScheduleEntry<C>>,
    instance_id: Uuid,
) {
    let Some(worker) = entry.worker.upgrade() else { return };
    // Sample payloads are validated at registration.
    let Some((kind, canonical)) = classify(&entry.sample_data) else { return };

    let mut tried: u32 = 0;
    loop {
        tried += 1;
        let message = Message {
            id: Uuid::new_v4(),
            size: canonical.len() as u64,
            path: String::new(),
            created_at: entry.clock.epoch_ms(),
            failed_at: None,
            failed_count: 0,
            kind,
        };
        let envelope = MessageEnvelope {
            message,
            queue_id: Uuid::nil(),
            value: entry.sample_data.clone(),
        };
        let context = JobContext {
            instance_id,
            job_name: entry.name.clone(),
            worker_name: worker.name().to_string(),
            queue_name: None,
            options: entry.options.job.clone(),
            handle_at: entry.clock.epoch_ms(),
            message: envelope,
            tried,
        };
        match job::execute_attempt(&entry.callback, context, entry.options.job.timeout).await {
            Ok(()) => {
                if entry.options.job.log {
                    tracing::info!(schedule = %entry.name, tried, "tick handled");
                }
                worker.down_instance(&entry.name, instance_id, InstanceKind::Schedule);
                return;
            }
            Err(error) => {
                tracing::warn!(schedule = %entry.name, tried, error = %error, "tick attempt failed");
                if tried < entry.options.job.retry + 1 {
                    tokio::time::sleep(Duration::from_millis(entry.options.job.retry_after)).await;
                    continue;
                }
                worker.down_instance(&entry.name, instance_id, InstanceKind::Schedule);
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
