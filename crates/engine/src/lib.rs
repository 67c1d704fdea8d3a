// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bbq-engine: the coordination layer of the BBQ embedded job queue.
//!
//! A [`Dispatcher`] owns named [`Queue`]s and priority-ordered [`Worker`]s.
//! Producers add messages to a queue; the queue persists them and signals
//! the dispatcher, which routes each message to the first worker observing
//! that queue. The worker hands the message to its least-loaded job, which
//! runs the user callback under a timeout with retry accounting.
//!
//! Everything here expects to run inside a Tokio runtime: timers, the
//! per-queue broadcast forwarders, and callback execution are all Tokio
//! tasks.

pub mod callback;
pub mod dispatcher;
pub mod error;
mod job;
pub mod queue;
mod runtime;
mod schedule;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use callback::{Callback, CallbackResult, JobContext};
pub use dispatcher::Dispatcher;
pub use error::BbqError;
pub use queue::Queue;
pub use worker::Worker;

// Leaf types callers need to drive the engine.
pub use bbq_core::{
    Clock, CronPattern, DispatcherConfig, FakeClock, JobOptions, Message, MessageEnvelope,
    PayloadKind, QueueOptions, ScheduleOptions, SecretMode, SystemClock, WorkerOptions,
};
