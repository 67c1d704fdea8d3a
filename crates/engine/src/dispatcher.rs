// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: the top-level registry of queues and workers.
//!
//! Queues live in a map keyed by id (names are kept unique on creation);
//! workers are held in descending priority order. Each broadcast envelope
//! goes to the first worker observing its queue; with no match the queue
//! is asked to resend after its rebroadcast delay. The registry itself is
//! snapshotted to `metabbq.json` so queues can be restored after restart.

use crate::error::BbqError;
use crate::queue::Queue;
use crate::worker::Worker;
use bbq_core::{Clock, DispatcherConfig, MessageEnvelope, QueueOptions, SystemClock,
    WorkerOptions};
use bbq_storage::{read_dispatcher_meta, write_dispatcher_meta, DispatcherMeta, QueueDescriptor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handle to one coordinator. Tests may run several in one process; each
/// owns its root directory exclusively.
pub struct Dispatcher<C: Clock = SystemClock> {
    core: Arc<DispatcherCore<C>>,
}

/// Shared interior reached from queues (via weak back-references) and from
/// the public handle.
pub(crate) struct DispatcherCore<C: Clock> {
    pub(crate) config: DispatcherConfig,
    pub(crate) clock: C,
    pub(crate) created_at: u64,
    pub(crate) queues: Mutex<HashMap<Uuid, Arc<Queue<C>>>>,
    pub(crate) workers: Mutex<Vec<Arc<Worker<C>>>>,
}

impl Dispatcher<SystemClock> {
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + 'static> Dispatcher<C> {
    pub fn with_clock(config: DispatcherConfig, clock: C) -> Self {
        let created_at = clock.epoch_ms();
        Self {
            core: Arc::new(DispatcherCore {
                config,
                clock,
                created_at,
                queues: Mutex::new(HashMap::new()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.core.config
    }

    /// Ensure the root directory, restore queues recorded in a previous
    /// dispatcher snapshot, and write a fresh snapshot.
    pub fn setup(&self) -> Result<(), BbqError> {
        fs::create_dir_all(&self.core.config.path)?;
        if let Some(meta) = read_dispatcher_meta(&self.core.config.path)? {
            for descriptor in meta.queues {
                if self.core.queue_by_name(&descriptor.name).is_some() {
                    continue;
                }
                self.apply_queue(descriptor)?;
            }
        }
        self.core.snapshot_meta();
        Ok(())
    }

    /// Re-open a restored queue with its persisted id and path.
    fn apply_queue(&self, descriptor: QueueDescriptor) -> Result<Arc<Queue<C>>, BbqError> {
        let mut options = descriptor.options.clone();
        // Secret material is never persisted; re-apply the configured key.
        options.secret_key = self.core.config.queue.secret_key.clone();
        options.secret_mode = self.core.config.queue.secret_mode;
        let queue = Queue::from_descriptor(
            &descriptor,
            options,
            self.core.config.log,
            self.core.clock.clone(),
            Arc::downgrade(&self.core),
        );
        queue.setup()?;
        self.core.queues.lock().insert(queue.id(), Arc::clone(&queue));
        Ok(queue)
    }

    /// Create a queue with the configured defaults. Idempotent by name.
    pub fn create_queue(&self, name: &str) -> Result<Arc<Queue<C>>, BbqError> {
        self.create_queue_with(name, self.core.config.queue.clone())
    }

    /// Create a queue with explicit options. Idempotent by name: an
    /// existing queue is returned as-is.
    pub fn create_queue_with(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<Arc<Queue<C>>, BbqError> {
        if let Some(existing) = self.core.queue_by_name(name) {
            return Ok(existing);
        }
        let path = self.core.config.path.join(format!("{:x}", md5::compute(name)));
        let queue = Queue::create(
            name.to_string(),
            path,
            options,
            self.core.config.log,
            self.core.clock.clone(),
            Arc::downgrade(&self.core),
        );
        queue.setup()?;
        self.core.queues.lock().insert(queue.id(), Arc::clone(&queue));
        self.core.snapshot_meta();
        if self.core.config.log {
            tracing::info!(queue = name, "queue created");
        }
        Ok(queue)
    }

    pub fn get_queue(&self, name: &str) -> Result<Arc<Queue<C>>, BbqError> {
        self.core
            .queue_by_name(name)
            .ok_or_else(|| BbqError::QueueNotFound(name.to_string()))
    }

    pub fn get_queue_by_id(&self, id: Uuid) -> Result<Arc<Queue<C>>, BbqError> {
        self.core
            .queues
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| BbqError::QueueNotFound(id.to_string()))
    }

    /// Remove a queue: abort its timers, delete its directory, unregister
    /// it, and snapshot the registry.
    pub fn delete_queue(&self, name: &str) -> Result<(), BbqError> {
        let queue = self.get_queue(name)?;
        queue.teardown();
        fs::remove_dir_all(queue.path())?;
        self.core.queues.lock().remove(&queue.id());
        self.core.snapshot_meta();
        if self.core.config.log {
            tracing::info!(queue = name, "queue deleted");
        }
        Ok(())
    }

    /// Register a worker, keeping the registry in descending priority
    /// order (ties keep insertion order).
    pub fn create_worker(
        &self,
        name: &str,
        options: WorkerOptions,
    ) -> Result<Arc<Worker<C>>, BbqError> {
        let mut workers = self.core.workers.lock();
        if workers.iter().any(|w| w.name() == name) {
            return Err(BbqError::NameDuplicate(name.to_string()));
        }
        let worker = Worker::create(
            name.to_string(),
            options,
            self.core.clock.clone(),
            Arc::downgrade(&self.core),
        );
        let pos = workers
            .iter()
            .position(|w| w.priority() < worker.priority())
            .unwrap_or(workers.len());
        workers.insert(pos, Arc::clone(&worker));
        Ok(worker)
    }

    /// Abort every timer, tick task, and broadcast forwarder. Durable state
    /// on disk stays sufficient to resume through [`Dispatcher::setup`].
    pub fn shutdown(&self) {
        for queue in self.core.queues.lock().values() {
            queue.teardown();
        }
        for worker in self.core.workers.lock().iter() {
            worker.stop();
        }
    }
}

impl<C: Clock + 'static> DispatcherCore<C> {
    pub(crate) fn queue_by_name(&self, name: &str) -> Option<Arc<Queue<C>>> {
        self.queues.lock().values().find(|q| q.name() == name).cloned()
    }

    /// Route one envelope to the first observing worker in priority order.
    pub(crate) fn listen(self: &Arc<Self>, envelope: MessageEnvelope) {
        let Some(queue) = self.queues.lock().get(&envelope.queue_id).cloned() else {
            // Queue deleted while the envelope was in flight.
            return;
        };
        let workers: Vec<_> = self.workers.lock().clone();
        for worker in &workers {
            if worker.observes(envelope.queue_id) {
                worker.run(&queue, envelope);
                return;
            }
        }
        // Nobody is listening; try again after the queue's rebroadcast delay.
        let delay = Duration::from_millis(queue.options().rebroadcast_time);
        queue.rebroadcast_later(envelope.message.id, delay);
    }

    /// Snapshot the queue registry. Failures are logged, never propagated.
    pub(crate) fn snapshot_meta(&self) {
        let mut descriptors: Vec<QueueDescriptor> =
            self.queues.lock().values().map(|q| q.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        let meta = DispatcherMeta {
            queues: descriptors,
            created_at: self.created_at,
            path: self.config.path.display().to_string(),
            secret: self.config.queue.is_secret(),
            log: self.config.log,
        };
        if let Err(e) = write_dispatcher_meta(&self.config.path, &meta) {
            tracing::warn!(error = %e, "dispatcher metadata snapshot failed");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
