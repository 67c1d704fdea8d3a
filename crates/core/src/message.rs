// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message record, envelope, and payload classification.
//!
//! A queue persists [`Message`] records; callbacks receive a
//! [`MessageEnvelope`], which is the record plus the source queue id and the
//! decoded payload value. Payloads are stored in a canonical string form:
//! identity for strings, decimal rendering for numbers, compact JSON for
//! everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payload classification persisted with each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    #[serde(rename = "string")]
    Text,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "object")]
    Object,
}

crate::simple_display! {
    PayloadKind {
        Text => "string",
        Number => "number",
        Object => "object",
    }
}

/// A persisted queue message. The payload body lives in its own file at
/// `path` (relative to the queue directory); this record carries only the
/// bookkeeping around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    /// Byte length of the canonical serialized form (before encryption).
    pub size: u64,
    /// Relative on-disk location of the payload file. Non-empty once the
    /// message has been persisted.
    pub path: String,
    pub created_at: u64,
    pub failed_at: Option<u64>,
    pub failed_count: u32,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
}

/// The shape handed to callbacks: a [`Message`] plus the source queue id and
/// the decoded payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    #[serde(flatten)]
    pub message: Message,
    pub queue_id: Uuid,
    pub value: Value,
}

/// Classify a payload value and render its canonical serialized form.
///
/// Returns `None` for `Value::Null`, which callers reject as an undefined
/// message. Booleans and arrays fall under the object classification and
/// serialize as compact JSON.
pub fn classify(value: &Value) -> Option<(PayloadKind, String)> {
    match value {
        Value::Null => None,
        Value::String(s) => Some((PayloadKind::Text, s.clone())),
        Value::Number(n) => Some((PayloadKind::Number, n.to_string())),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            Some((PayloadKind::Object, value.to_string()))
        }
    }
}

/// Decode a canonical serialized form back into the payload value.
pub fn decode(kind: PayloadKind, raw: &str) -> Result<Value, serde_json::Error> {
    match kind {
        PayloadKind::Text => Ok(Value::String(raw.to_string())),
        PayloadKind::Number => serde_json::from_str::<serde_json::Number>(raw).map(Value::Number),
        PayloadKind::Object => serde_json::from_str(raw),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
