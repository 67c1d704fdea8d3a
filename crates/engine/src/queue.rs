// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, named mailbox.
//!
//! A queue owns its directory on disk and its in-memory pipeline and fails
//! lists, both ordered by creation time. Payload bodies live in one file
//! per message; list membership and bookkeeping live in the debounced
//! `metaq.json` snapshot. New messages are broadcast to the dispatcher
//! through a per-queue forwarder task so delivery order matches append
//! order.

use crate::dispatcher::DispatcherCore;
use crate::error::BbqError;
use bbq_core::{classify, decode, Clock, Message, MessageEnvelope, QueueOptions};
use bbq_storage::{
    read_queue_meta, write_queue_meta, PayloadCipher, PayloadStore, QueueDescriptor, QueueMeta,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Deferred-deletion delay applied by [`Queue::done`], so late cleanup races
/// after callback completion are harmless.
pub(crate) const DONE_DELAY_MS: u64 = 1_000;

/// A durable, named message queue.
pub struct Queue<C: Clock> {
    id: Uuid,
    name: String,
    path: PathBuf,
    options: QueueOptions,
    created_at: u64,
    log: bool,
    clock: C,
    store: PayloadStore,
    dispatcher: Weak<DispatcherCore<C>>,
    broadcast_tx: mpsc::UnboundedSender<MessageEnvelope>,
    state: Mutex<QueueState>,
    tasks: Mutex<QueueTasks>,
}

#[derive(Default)]
struct QueueState {
    pipeline: Vec<Message>,
    fails: Vec<Message>,
}

#[derive(Default)]
struct QueueTasks {
    /// Pending deletion timer per message id.
    timers: HashMap<Uuid, JoinHandle<()>>,
    /// Pending back-pressure re-emission per message id.
    rebroadcasts: HashMap<Uuid, JoinHandle<()>>,
    /// Debounced metadata writer.
    meta_writer: Option<JoinHandle<()>>,
    /// Ordered broadcast forwarder.
    forwarder: Option<JoinHandle<()>>,
}

impl<C: Clock + 'static> Queue<C> {
    /// Create a queue with a fresh identity.
    pub(crate) fn create(
        name: String,
        path: PathBuf,
        options: QueueOptions,
        log: bool,
        clock: C,
        dispatcher: Weak<DispatcherCore<C>>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let created_at = clock.epoch_ms();
        Self::build(id, created_at, name, path, options, log, clock, dispatcher)
    }

    /// Re-open a queue restored from the dispatcher snapshot, keeping its
    /// persisted id and path.
    pub(crate) fn from_descriptor(
        descriptor: &QueueDescriptor,
        options: QueueOptions,
        log: bool,
        clock: C,
        dispatcher: Weak<DispatcherCore<C>>,
    ) -> Arc<Self> {
        let created_at = clock.epoch_ms();
        Self::build(
            descriptor.id,
            created_at,
            descriptor.name.clone(),
            PathBuf::from(&descriptor.path),
            options,
            log,
            clock,
            dispatcher,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        id: Uuid,
        created_at: u64,
        name: String,
        path: PathBuf,
        options: QueueOptions,
        log: bool,
        clock: C,
        dispatcher: Weak<DispatcherCore<C>>,
    ) -> Arc<Self> {
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let cipher = PayloadCipher::from_options(&options.secret_key, options.secret_mode);
        let store = PayloadStore::new(&path, cipher);
        let queue = Arc::new(Self {
            id,
            name,
            path,
            options,
            created_at,
            log,
            clock,
            store,
            dispatcher,
            broadcast_tx,
            state: Mutex::new(QueueState::default()),
            tasks: Mutex::new(QueueTasks::default()),
        });
        queue.spawn_forwarder(broadcast_rx);
        queue
    }

    /// Forward broadcasts to the dispatcher one at a time, preserving
    /// append order.
    fn spawn_forwarder(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<MessageEnvelope>) {
        let dispatcher = self.dispatcher.clone();
        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let Some(core) = dispatcher.upgrade() else { break };
                core.listen(envelope);
            }
        });
        self.tasks.lock().forwarder = Some(handle);
    }

    /// Ensure the on-disk layout, restore any previous snapshot, re-arm
    /// expiration timers, write a fresh snapshot, and re-emit everything so
    /// in-flight work resumes.
    pub(crate) fn setup(self: &Arc<Self>) -> Result<(), BbqError> {
        self.store.ensure_dir()?;

        // Read the existing snapshot before writing the fresh one so a
        // crash between the two never loses the old state.
        if let Some(meta) = read_queue_meta(&self.path)? {
            let mut state = self.state.lock();
            state.pipeline = meta.pipeline;
            state.fails = meta.fails;
        }

        if self.options.expire > 0 {
            let now = self.clock.epoch_ms();
            let expire_ms = self.options.expire * 1_000;
            let pending: Vec<(Uuid, u64)> = {
                let state = self.state.lock();
                state
                    .pipeline
                    .iter()
                    .chain(state.fails.iter())
                    .map(|m| (m.id, m.created_at))
                    .collect()
            };
            for (id, created_at) in pending {
                let remaining = expire_ms.saturating_sub(now.saturating_sub(created_at)).max(1);
                self.arm_deletion(id, Duration::from_millis(remaining));
            }
        }

        // A crash between a payload write and the next snapshot leaves an
        // untracked file behind; drop those so disk matches the lists.
        let keep: std::collections::HashSet<String> = {
            let state = self.state.lock();
            state
                .pipeline
                .iter()
                .chain(state.fails.iter())
                .map(|m| PayloadStore::file_name(m.id))
                .collect()
        };
        match self.store.prune(&keep) {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(queue = %self.name, removed, "pruned orphaned payload files");
            }
            Err(e) => {
                tracing::warn!(queue = %self.name, error = %e, "payload prune failed");
            }
        }

        self.write_snapshot();
        self.rebroadcast(true);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Snapshot of the live pipeline, creation order ascending.
    pub fn pipeline(&self) -> Vec<Message> {
        self.state.lock().pipeline.clone()
    }

    /// Snapshot of the fails list, creation order ascending.
    pub fn fails(&self) -> Vec<Message> {
        self.state.lock().fails.clone()
    }

    pub fn pipeline_len(&self) -> usize {
        self.state.lock().pipeline.len()
    }

    pub fn fails_len(&self) -> usize {
        self.state.lock().fails.len()
    }

    /// True while the payload file for a message exists on disk.
    pub fn has_payload(&self, message_id: Uuid) -> bool {
        self.store.exists(message_id)
    }

    pub(crate) fn descriptor(&self) -> QueueDescriptor {
        QueueDescriptor {
            id: self.id,
            name: self.name.clone(),
            path: self.path.display().to_string(),
            options: self.options.clone(),
        }
    }

    /// Validate, persist, and broadcast a new message.
    ///
    /// The payload must not be JSON null, the pipeline must have room when
    /// a limit is configured, and the canonical form must fit the size cap.
    /// Nothing is persisted and nothing is broadcast when validation or the
    /// payload write fails.
    pub fn add_message(self: &Arc<Self>, value: Value) -> Result<Message, BbqError> {
        let (kind, canonical) = classify(&value).ok_or(BbqError::MessageUndefined)?;
        if self.options.limit > 0 {
            let pipelined = self.state.lock().pipeline.len();
            if pipelined + 1 > self.options.limit {
                return Err(BbqError::QueueFull { limit: self.options.limit });
            }
        }
        let size = canonical.len() as u64;
        if size > self.options.size {
            return Err(BbqError::MessageTooLarge { size, max: self.options.size });
        }

        let id = Uuid::new_v4();
        self.store.write(id, &canonical)?;
        let message = Message {
            id,
            size,
            path: PayloadStore::relative_path(id),
            created_at: self.clock.epoch_ms(),
            failed_at: None,
            failed_count: 0,
            kind,
        };
        insert_by_created_at(&mut self.state.lock().pipeline, message.clone());

        if self.options.expire > 0 {
            self.arm_deletion(id, Duration::from_millis(self.options.expire * 1_000));
        }
        if self.log {
            tracing::info!(queue = %self.name, message = %id, size, "message added");
        }
        self.emit(MessageEnvelope { message: message.clone(), queue_id: self.id, value });
        self.schedule_snapshot();
        Ok(message)
    }

    /// Move a pipelined message to the fails list, stamping the failure.
    ///
    /// Already-failed messages are returned unchanged; unknown ids yield
    /// `None`. Never an error surface.
    pub fn fail(self: &Arc<Self>, message_id: Uuid) -> Option<Message> {
        let updated = {
            let mut state = self.state.lock();
            if let Some(existing) = state.fails.iter().find(|m| m.id == message_id) {
                return Some(existing.clone());
            }
            let pos = state.pipeline.iter().position(|m| m.id == message_id)?;
            let mut message = state.pipeline.remove(pos);
            message.failed_at = Some(self.clock.epoch_ms());
            message.failed_count += 1;
            insert_by_created_at(&mut state.fails, message.clone());
            message
        };
        self.schedule_snapshot();
        Some(updated)
    }

    /// Take a failed message out of the queue entirely. The caller assumes
    /// responsibility for it: the record leaves the fails list and its
    /// payload file is deleted.
    pub fn get_fail(self: &Arc<Self>, message_id: Uuid) -> Result<Option<MessageEnvelope>, BbqError> {
        let message = {
            let state = self.state.lock();
            match state.fails.iter().find(|m| m.id == message_id) {
                Some(message) => message.clone(),
                None => return Ok(None),
            }
        };
        let canonical = self.store.read(message_id)?;
        let value = decode(message.kind, &canonical)
            .map_err(|e| BbqError::Storage(e.into()))?;

        self.state.lock().fails.retain(|m| m.id != message_id);
        self.cancel_deletion(message_id);
        if let Err(e) = self.store.remove(message_id) {
            tracing::warn!(queue = %self.name, message = %message_id, error = %e, "payload cleanup failed");
        }
        self.schedule_snapshot();
        Ok(Some(MessageEnvelope { message, queue_id: self.id, value }))
    }

    /// Mark a message handled. Deletion is deferred by [`DONE_DELAY_MS`];
    /// the nil id is accepted and ignored.
    pub fn done(self: &Arc<Self>, message_id: Uuid) {
        if message_id.is_nil() {
            return;
        }
        self.arm_deletion(message_id, Duration::from_millis(DONE_DELAY_MS));
    }

    /// Operator removal: drop the message from whichever list holds it and
    /// delete its payload file immediately.
    pub fn remove_message(self: &Arc<Self>, message_id: Uuid) -> Option<Message> {
        let removed = {
            let mut state = self.state.lock();
            if let Some(pos) = state.pipeline.iter().position(|m| m.id == message_id) {
                Some(state.pipeline.remove(pos))
            } else if let Some(pos) = state.fails.iter().position(|m| m.id == message_id) {
                Some(state.fails.remove(pos))
            } else {
                None
            }
        }?;
        self.cancel_deletion(message_id);
        if let Err(e) = self.store.remove(message_id) {
            tracing::warn!(queue = %self.name, message = %message_id, error = %e, "payload cleanup failed");
        }
        if self.log {
            tracing::info!(queue = %self.name, message = %message_id, "message removed");
        }
        self.schedule_snapshot();
        Some(removed)
    }

    /// Re-emit every persisted message in the pipeline (and, if requested,
    /// the fails list), re-read and decrypted from disk.
    pub fn rebroadcast(self: &Arc<Self>, with_fails: bool) {
        let messages = {
            let state = self.state.lock();
            let mut list = state.pipeline.clone();
            if with_fails {
                list.extend(state.fails.iter().cloned());
            }
            list
        };
        for message in messages {
            self.emit_from_disk(message);
        }
    }

    /// Re-emit one message after `delay`, the back-pressure path. A newer
    /// request for the same message replaces the pending one.
    pub(crate) fn rebroadcast_later(self: &Arc<Self>, message_id: Uuid, delay: Duration) {
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.tasks.lock().rebroadcasts.remove(&message_id);
            let message = {
                let state = queue.state.lock();
                state
                    .pipeline
                    .iter()
                    .chain(state.fails.iter())
                    .find(|m| m.id == message_id)
                    .cloned()
            };
            // The message may have completed or expired in the meantime.
            if let Some(message) = message {
                queue.emit_from_disk(message);
            }
        });
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.rebroadcasts.insert(message_id, handle) {
            previous.abort();
        }
    }

    /// Arm (or re-arm) the deletion timer for a message.
    fn arm_deletion(self: &Arc<Self>, message_id: Uuid, delay: Duration) {
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.remove_message(message_id);
        });
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.timers.insert(message_id, handle) {
            previous.abort();
        }
    }

    fn cancel_deletion(&self, message_id: Uuid) {
        if let Some(timer) = self.tasks.lock().timers.remove(&message_id) {
            timer.abort();
        }
    }

    fn emit_from_disk(self: &Arc<Self>, message: Message) {
        let canonical = match self.store.read(message.id) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::warn!(queue = %self.name, message = %message.id, error = %e, "payload read failed, skipping rebroadcast");
                return;
            }
        };
        let value = match decode(message.kind, &canonical) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(queue = %self.name, message = %message.id, error = %e, "payload decode failed, skipping rebroadcast");
                return;
            }
        };
        self.emit(MessageEnvelope { queue_id: self.id, message, value });
    }

    fn emit(&self, envelope: MessageEnvelope) {
        // The forwarder only stops when the queue is torn down.
        let _ = self.broadcast_tx.send(envelope);
    }

    /// Debounced metadata snapshot: each trigger cancels the pending writer
    /// and restarts the window.
    pub(crate) fn schedule_snapshot(self: &Arc<Self>) {
        let delay = Duration::from_millis(self.options.effective_update_meta_time());
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.write_snapshot();
        });
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.meta_writer.replace(handle) {
            previous.abort();
        }
    }

    /// Write the snapshot now. Failures are logged, never propagated; the
    /// next snapshot overwrites.
    pub(crate) fn write_snapshot(&self) {
        let meta = {
            let state = self.state.lock();
            QueueMeta {
                id: self.id,
                name: self.name.clone(),
                path: self.path.display().to_string(),
                size: self.options.size,
                expire: self.options.expire,
                limit: self.options.limit,
                secret: self.options.is_secret(),
                created_at: self.created_at,
                pipeline: state.pipeline.clone(),
                fails: state.fails.clone(),
            }
        };
        if let Err(e) = write_queue_meta(&self.path, &meta) {
            tracing::warn!(queue = %self.name, error = %e, "metadata snapshot failed");
        }
    }

    /// Abort every timer and task owned by this queue.
    pub(crate) fn teardown(&self) {
        let mut tasks = self.tasks.lock();
        for (_, timer) in tasks.timers.drain() {
            timer.abort();
        }
        for (_, pending) in tasks.rebroadcasts.drain() {
            pending.abort();
        }
        if let Some(writer) = tasks.meta_writer.take() {
            writer.abort();
        }
        if let Some(forwarder) = tasks.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// Insert preserving ascending `created_at`; equal keys keep arrival order.
fn insert_by_created_at(list: &mut Vec<Message>, message: Message) {
    let pos = list
        .iter()
        .position(|m| m.created_at > message.created_at)
        .unwrap_or(list.len());
    list.insert(pos, message);
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
