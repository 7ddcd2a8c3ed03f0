//! Federation event types.
//!
//! Events are the contract between producers (master loop, worker
//! executions, dispatch table) and consumers (renderers, loggers, tests).
//! Every event carries a type tag, a UTC timestamp, an optional worker id
//! (absent for master-scoped events) and a free-form JSON payload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Incremental text chunk from the master.
    MasterText,
    /// The master is invoking a dispatch operation.
    MasterToolCall,
    /// A dispatch operation returned its text result.
    MasterToolResult,
    /// The master produced a final answer.
    MasterDone,
    /// A worker record was created from a template.
    WorkerSpawned,
    /// A worker execution began running a delegated task.
    WorkerStarted,
    /// Incremental text chunk from a worker.
    WorkerText,
    /// A worker is invoking one of its file tools.
    WorkerToolCall,
    /// A worker execution finished (successfully, by failure or by timeout).
    WorkerDone,
    /// A worker execution failed; `worker_done` follows with the failure text.
    WorkerError,
    /// A worker record was removed.
    WorkerTerminated,
    /// A delegation was accepted by the dispatch table.
    DelegationStarted,
    /// A delegation's result reached the completion queue.
    DelegationCompleted,
    /// Human-readable status line.
    StatusUpdate,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MasterText => "master_text",
            EventKind::MasterToolCall => "master_tool_call",
            EventKind::MasterToolResult => "master_tool_result",
            EventKind::MasterDone => "master_done",
            EventKind::WorkerSpawned => "worker_spawned",
            EventKind::WorkerStarted => "worker_started",
            EventKind::WorkerText => "worker_text",
            EventKind::WorkerToolCall => "worker_tool_call",
            EventKind::WorkerDone => "worker_done",
            EventKind::WorkerError => "worker_error",
            EventKind::WorkerTerminated => "worker_terminated",
            EventKind::DelegationStarted => "delegation_started",
            EventKind::DelegationCompleted => "delegation_completed",
            EventKind::StatusUpdate => "status_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl FederationEvent {
    /// Creates an event stamped with the current time.
    ///
    /// Non-object payloads are replaced by an empty map.
    pub fn new(kind: EventKind, worker_id: Option<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind,
            timestamp: Utc::now(),
            worker_id,
            payload,
        }
    }

    pub fn master_text(text: impl Into<String>) -> Self {
        Self::new(EventKind::MasterText, None, json!({ "text": text.into() }))
    }

    pub fn master_tool_call(tool_name: &str, tool_input: &Value) -> Self {
        Self::new(
            EventKind::MasterToolCall,
            None,
            json!({ "tool_name": tool_name, "tool_input": tool_input }),
        )
    }

    pub fn master_tool_result(tool_name: &str, result: &str) -> Self {
        Self::new(
            EventKind::MasterToolResult,
            None,
            json!({ "tool_name": tool_name, "result": result }),
        )
    }

    pub fn master_done() -> Self {
        Self::new(EventKind::MasterDone, None, json!({}))
    }

    pub fn worker_spawned(worker_id: &str, agent_type: &str) -> Self {
        Self::new(
            EventKind::WorkerSpawned,
            Some(worker_id.to_string()),
            json!({ "agent_type": agent_type }),
        )
    }

    pub fn worker_started(worker_id: &str, task: &str) -> Self {
        Self::new(
            EventKind::WorkerStarted,
            Some(worker_id.to_string()),
            json!({ "task": task }),
        )
    }

    pub fn worker_text(worker_id: &str, text: impl Into<String>) -> Self {
        Self::new(
            EventKind::WorkerText,
            Some(worker_id.to_string()),
            json!({ "text": text.into() }),
        )
    }

    pub fn worker_tool_call(worker_id: &str, tool_name: &str, tool_input: &Value) -> Self {
        Self::new(
            EventKind::WorkerToolCall,
            Some(worker_id.to_string()),
            json!({ "tool_name": tool_name, "tool_input": tool_input }),
        )
    }

    pub fn worker_done(worker_id: &str, result: &str, timed_out: bool) -> Self {
        Self::new(
            EventKind::WorkerDone,
            Some(worker_id.to_string()),
            json!({ "result": result, "timed_out": timed_out }),
        )
    }

    pub fn worker_error(worker_id: &str, error: &str) -> Self {
        Self::new(
            EventKind::WorkerError,
            Some(worker_id.to_string()),
            json!({ "error": error }),
        )
    }

    pub fn worker_terminated(worker_id: &str) -> Self {
        Self::new(
            EventKind::WorkerTerminated,
            Some(worker_id.to_string()),
            json!({}),
        )
    }

    pub fn delegation_started(worker_id: &str, task: &str, intention: &str) -> Self {
        Self::new(
            EventKind::DelegationStarted,
            Some(worker_id.to_string()),
            json!({ "task": task, "intention": intention }),
        )
    }

    pub fn delegation_completed(
        worker_id: &str,
        result: &str,
        intention: &str,
        timed_out: bool,
    ) -> Self {
        Self::new(
            EventKind::DelegationCompleted,
            Some(worker_id.to_string()),
            json!({ "result": result, "intention": intention, "timed_out": timed_out }),
        )
    }

    pub fn status_update(worker_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(
            EventKind::StatusUpdate,
            worker_id.map(str::to_string),
            json!({ "message": message.into() }),
        )
    }

    /// Returns a string payload field, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Returns the `text` payload of `master_text` / `worker_text` events.
    pub fn text(&self) -> Option<&str> {
        match self.kind {
            EventKind::MasterText | EventKind::WorkerText => self.payload_str("text"),
            _ => None,
        }
    }
}
