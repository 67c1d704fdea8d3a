// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process execution of module callbacks.
//!
//! Each attempt spawns the module under its interpreter, writes the
//! serialized [`JobContext`](crate::callback::JobContext) to the child's
//! stdin, and maps the exit status back onto the attempt outcome. A timed
//! out child is killed rather than awaited.

use crate::callback::JobContext;
use crate::error::BbqError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Interpreters for the recognized module extensions.
const RUNNERS: &[(&str, &str)] = &[("sh", "sh"), ("js", "node"), ("py", "python3")];

/// Interpreter for a module path, `None` when the extension is unrecognized.
pub(crate) fn runner_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    RUNNERS.iter().find(|(e, _)| *e == ext).map(|(_, runner)| *runner)
}

/// Run one attempt of a module callback.
pub(crate) async fn run_module(
    path: &Path,
    context: &JobContext,
    timeout: Duration,
) -> Result<(), BbqError> {
    let runner = runner_for(path)
        .ok_or_else(|| BbqError::CallbackInvalid(path.display().to_string()))?;
    let payload =
        serde_json::to_vec(context).map_err(|e| BbqError::WorkerRuntime(e.to_string()))?;

    let mut child = Command::new(runner)
        .arg(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            BbqError::WorkerRuntime(format!(
                "failed to start {runner} for {}: {e}",
                path.display()
            ))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Modules are free to ignore their stdin; a broken pipe here is not
        // an attempt failure.
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    }

    // Dropping the wait future on timeout kills the child (kill_on_drop).
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => Err(BbqError::Timeout(timeout.as_millis() as u64)),
        Ok(Err(e)) => Err(BbqError::WorkerRuntime(e.to_string())),
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            Err(BbqError::CallbackFailed(if detail.is_empty() {
                format!("module exited with {}", output.status)
            } else {
                detail.to_string()
            }))
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
