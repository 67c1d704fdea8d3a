// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker: registry of jobs and schedule jobs, plus the dispatch loop.
//!
//! Each routed message goes to the least-loaded eligible job (ties keep
//! registration order). When every job on a queue is saturated the worker
//! pauses its observer for that queue and asks the queue to resend later;
//! accepting a message re-arms the observer. A legacy interval loop
//! re-drives every job so freed capacity is served even without new
//! arrivals.

use crate::callback::Callback;
use crate::dispatcher::DispatcherCore;
use crate::error::BbqError;
use crate::job::{self, JobEntry, JobState};
use crate::queue::Queue;
use crate::schedule::{self, ScheduleEntry, ScheduleState};
use bbq_core::{classify, Clock, CronPattern, JobOptions, MessageEnvelope, ScheduleOptions,
    WorkerOptions};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Which registry a finished instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstanceKind {
    Job,
    Schedule,
}

/// A named worker holding job registrations and queue observers.
pub struct Worker<C: Clock> {
    name: String,
    options: WorkerOptions,
    clock: C,
    dispatcher: Weak<DispatcherCore<C>>,
    jobs: Mutex<Vec<Arc<JobEntry<C>>>>,
    schedules: Mutex<Vec<Arc<ScheduleEntry<C>>>>,
    /// queue id → actively accepting routing for that queue.
    observers: Mutex<HashMap<Uuid, bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Clock> std::fmt::Debug for Worker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<C: Clock + 'static> Worker<C> {
    pub(crate) fn create(
        name: String,
        options: WorkerOptions,
        clock: C,
        dispatcher: Weak<DispatcherCore<C>>,
    ) -> Arc<Self> {
        let worker = Arc::new(Self {
            name,
            options,
            clock,
            dispatcher,
            jobs: Mutex::new(Vec::new()),
            schedules: Mutex::new(Vec::new()),
            observers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        });
        worker.spawn_interval_loop();
        worker
    }

    /// Legacy interval variant of the dispatch loop: periodically re-drive
    /// every job so queued working messages are served once capacity frees.
    fn spawn_interval_loop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = Duration::from_millis(self.options.interval_run_job.max(1));
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(worker) = weak.upgrade() else { break };
                let jobs: Vec<_> = worker.jobs.lock().clone();
                for entry in jobs {
                    worker.drive(&entry);
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub(crate) fn priority(&self) -> i32 {
        self.options.priority
    }

    /// Register a job consuming from a queue.
    pub fn create_job(
        self: &Arc<Self>,
        name: &str,
        queue_name: &str,
        callback: Callback,
        options: JobOptions,
    ) -> Result<(), BbqError> {
        self.ensure_unique_name(name)?;
        callback.validate()?;
        let dispatcher = self
            .dispatcher
            .upgrade()
            .ok_or_else(|| BbqError::QueueNotFound(queue_name.to_string()))?;
        let queue = dispatcher
            .queue_by_name(queue_name)
            .ok_or_else(|| BbqError::QueueNotFound(queue_name.to_string()))?;

        let entry = Arc::new(JobEntry {
            name: name.to_string(),
            queue: Arc::clone(&queue),
            callback,
            options,
            clock: self.clock.clone(),
            worker: Arc::downgrade(self),
            state: Mutex::new(JobState::default()),
        });
        self.jobs.lock().push(entry);
        self.observers.lock().insert(queue.id(), true);
        if self.options.log {
            tracing::info!(worker = %self.name, job = name, queue = queue_name, "job registered");
        }
        Ok(())
    }

    /// Register a time-triggered job.
    pub fn create_schedule_job(
        self: &Arc<Self>,
        name: &str,
        callback: Callback,
        pattern: &str,
        sample_data: Value,
        options: ScheduleOptions,
    ) -> Result<(), BbqError> {
        self.ensure_unique_name(name)?;
        callback.validate()?;
        let pattern = CronPattern::parse(pattern)?;
        classify(&sample_data).ok_or(BbqError::MessageUndefined)?;

        let entry = Arc::new(ScheduleEntry {
            name: name.to_string(),
            sample_data,
            pattern,
            callback,
            options,
            clock: self.clock.clone(),
            worker: Arc::downgrade(self),
            state: Mutex::new(ScheduleState::default()),
        });
        self.schedules.lock().push(Arc::clone(&entry));
        let handle = schedule::spawn_tick(self, entry);
        self.tasks.lock().push(handle);
        if self.options.log {
            tracing::info!(worker = %self.name, schedule = name, "schedule job registered");
        }
        Ok(())
    }

    fn ensure_unique_name(&self, name: &str) -> Result<(), BbqError> {
        let duplicate = self.jobs.lock().iter().any(|j| j.name == name)
            || self.schedules.lock().iter().any(|s| s.name == name);
        if duplicate {
            return Err(BbqError::NameDuplicate(name.to_string()));
        }
        Ok(())
    }

    /// True when this worker is listening to the queue and not paused.
    pub fn observes(&self, queue_id: Uuid) -> bool {
        self.observers.lock().get(&queue_id).copied().unwrap_or(false)
    }

    /// Accepted-but-not-started message count of a job; `None` for unknown
    /// names.
    pub fn working_count(&self, job_name: &str) -> Option<usize> {
        self.job_by_name(job_name).map(|j| j.state.lock().working.len())
    }

    /// Live instance count of a job or schedule job; `None` for unknown
    /// names.
    pub fn instance_count(&self, name: &str) -> Option<usize> {
        if let Some(job) = self.job_by_name(name) {
            return Some(job.state.lock().instances.len());
        }
        self.schedule_by_name(name).map(|s| s.state.lock().instances.len())
    }

    /// Core dispatch: hand a routed envelope to the least-loaded eligible
    /// job, or pause the queue observer and ask for a resend.
    pub(crate) fn run(self: &Arc<Self>, queue: &Arc<Queue<C>>, envelope: MessageEnvelope) {
        let bound: Vec<_> = {
            let jobs = self.jobs.lock();
            jobs.iter().filter(|j| j.queue.id() == queue.id()).cloned().collect()
        };

        let mut best: Option<(usize, Arc<JobEntry<C>>)> = None;
        for entry in bound {
            let len = entry.state.lock().working.len();
            if len >= entry.options.working_message_count {
                continue;
            }
            // Smallest working set wins; ties keep registration order.
            let replace = match &best {
                Some((best_len, _)) => len < *best_len,
                None => true,
            };
            if replace {
                best = Some((len, entry));
            }
        }

        let Some((_, entry)) = best else {
            self.observers.lock().insert(queue.id(), false);
            if self.options.log {
                tracing::info!(worker = %self.name, queue = %queue.name(), message = %envelope.message.id, "saturated, pausing observer");
            }
            let delay = Duration::from_millis(queue.options().rebroadcast_time);
            queue.rebroadcast_later(envelope.message.id, delay);
            return;
        };

        entry.state.lock().working.push_back(envelope);
        self.drive(&entry);
    }

    /// Concurrency loop: start instances for queued working messages while
    /// slots are free.
    pub(crate) fn drive(self: &Arc<Self>, entry: &Arc<JobEntry<C>>) {
        loop {
            let next = {
                let mut state = entry.state.lock();
                if state.instances.len() >= entry.options.concurrency {
                    None
                } else {
                    // First working message not yet handed to an instance.
                    // It stays in the working list until the instance starts
                    // and reports down_message.
                    let unserved = state
                        .working
                        .iter()
                        .find(|m| !state.dispatched.contains(&m.message.id))
                        .cloned();
                    unserved.map(|envelope| {
                        let instance_id = Uuid::new_v4();
                        state.instances.insert(instance_id);
                        state.dispatched.insert(envelope.message.id);
                        (instance_id, envelope)
                    })
                }
            };
            let Some((instance_id, envelope)) = next else { break };
            tokio::spawn(job::run_instance(Arc::clone(entry), instance_id, envelope));
        }
    }

    /// A job accepted a message: drop it from the working list and unpause
    /// the source queue's observer.
    pub(crate) fn down_message(&self, job_name: &str, envelope: &MessageEnvelope) {
        if let Some(entry) = self.job_by_name(job_name) {
            let mut state = entry.state.lock();
            state.working.retain(|m| m.message.id != envelope.message.id);
            state.dispatched.remove(&envelope.message.id);
        }
        self.observers.lock().insert(envelope.queue_id, true);
    }

    /// An instance finished (success or terminal failure): free its slot.
    pub(crate) fn down_instance(self: &Arc<Self>, name: &str, instance_id: Uuid, kind: InstanceKind) {
        match kind {
            InstanceKind::Job => {
                if let Some(entry) = self.job_by_name(name) {
                    entry.state.lock().instances.remove(&instance_id);
                    self.drive(&entry);
                }
            }
            InstanceKind::Schedule => {
                if let Some(entry) = self.schedule_by_name(name) {
                    entry.state.lock().instances.remove(&instance_id);
                }
            }
        }
    }

    fn job_by_name(&self, name: &str) -> Option<Arc<JobEntry<C>>> {
        self.jobs.lock().iter().find(|j| j.name == name).cloned()
    }

    fn schedule_by_name(&self, name: &str) -> Option<Arc<ScheduleEntry<C>>> {
        self.schedules.lock().iter().find(|s| s.name == name).cloned()
    }

    /// Abort the interval loop and every schedule tick.
    pub(crate) fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
