// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback model: in-process functions and external script modules.
//!
//! A job's callback is either a function executed on the orchestration
//! runtime or the absolute path of a script module executed in a child
//! process. Anything else is rejected at registration time.

use crate::error::BbqError;
use crate::runtime;
use bbq_core::{JobOptions, MessageEnvelope};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// What a callback returns: `Ok` marks the message handled, any error routes
/// it to the queue's fails list and the retry path.
pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type CallbackFuture = Pin<Box<dyn Future<Output = CallbackResult> + Send>>;
type CallbackFn = Arc<dyn Fn(JobContext) -> CallbackFuture + Send + Sync>;

/// A job's callback.
#[derive(Clone)]
pub enum Callback {
    /// In-process async function.
    Function(CallbackFn),
    /// Absolute path of a script module run in an isolated child process.
    Module(PathBuf),
}

impl Callback {
    /// Wrap an async function as an in-process callback.
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        Self::Function(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Reference a script module by path.
    pub fn module(path: impl Into<PathBuf>) -> Self {
        Self::Module(path.into())
    }

    /// Reject callbacks that are neither a function nor a recognized,
    /// absolute module path.
    pub(crate) fn validate(&self) -> Result<(), BbqError> {
        match self {
            Self::Function(_) => Ok(()),
            Self::Module(path) => {
                if !path.is_absolute() {
                    return Err(BbqError::CallbackInvalid(format!(
                        "module path must be absolute: {}",
                        path.display()
                    )));
                }
                if runtime::runner_for(path).is_none() {
                    return Err(BbqError::CallbackInvalid(format!(
                        "unrecognized module extension: {}",
                        path.display()
                    )));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Callback::Function"),
            Self::Module(path) => write!(f, "Callback::Module({})", path.display()),
        }
    }
}

/// The structured handle passed to every callback attempt. Module callbacks
/// receive it serialized as JSON on stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    /// Id of the job instance running this attempt.
    pub instance_id: Uuid,
    pub job_name: String,
    pub worker_name: String,
    /// Source queue name; `None` for schedule jobs.
    pub queue_name: Option<String>,
    pub options: JobOptions,
    /// Epoch ms at which this attempt was handed to the callback.
    pub handle_at: u64,
    pub message: MessageEnvelope,
    /// Attempt counter, starting at 1.
    pub tried: u32,
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
