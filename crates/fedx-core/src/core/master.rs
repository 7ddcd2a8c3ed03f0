//! Master control loop.
//!
//! Sends the transcript and the dispatch catalog to the completion service,
//! streams text out as `master_text` events, runs every requested operation
//! through the [`DispatchTable`] and repeats until a turn arrives with no
//! tool calls.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::core::bus::EventBus;
use crate::core::dispatch::DispatchTable;
use crate::core::events::FederationEvent;
use crate::core::turn::consume_stream;
use crate::providers::{ChatMessage, CompletionRequest, CompletionService};
use crate::tools::{ToolDefinition, ToolResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterStatus {
    Idle,
    Thinking,
    /// Executing a dispatch operation.
    CallingTool(String),
}

impl fmt::Display for MasterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterStatus::Idle => f.write_str("idle"),
            MasterStatus::Thinking => f.write_str("thinking"),
            MasterStatus::CallingTool(name) => write!(f, "calling_tool:{name}"),
        }
    }
}

/// One conversation with the master model.
///
/// `run` takes `&mut self`, so concurrent turns on the same conversation are
/// ruled out by the borrow checker; callers serialize.
pub struct MasterLoop {
    completion: Arc<dyn CompletionService>,
    dispatch: DispatchTable,
    bus: Arc<EventBus>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    messages: Vec<ChatMessage>,
    status: MasterStatus,
}

impl fmt::Debug for MasterLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterLoop")
            .field("status", &self.status)
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl MasterLoop {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        dispatch: DispatchTable,
        bus: Arc<EventBus>,
        system_prompt: String,
    ) -> Self {
        let tools = dispatch.definitions();
        Self {
            completion,
            dispatch,
            bus,
            system_prompt,
            tools,
            messages: Vec::new(),
            status: MasterStatus::Idle,
        }
    }

    pub fn status(&self) -> &MasterStatus {
        &self.status
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Runs one user request to its final answer.
    ///
    /// On error the transcript is rolled back to its state before the call,
    /// so the conversation can continue with a new request.
    ///
    /// # Errors
    /// Returns transport, HTTP or in-stream errors from the completion service.
    pub async fn run(&mut self, user_message: &str) -> Result<String> {
        let checkpoint = self.messages.len();
        self.messages.push(ChatMessage::user(user_message));

        let result = self.drive().await;
        if result.is_err() {
            self.messages.truncate(checkpoint);
        }
        self.set_status(MasterStatus::Idle);
        if result.is_ok() {
            self.bus.emit(FederationEvent::master_done());
        }
        result
    }

    async fn drive(&mut self) -> Result<String> {
        let mut turns = 0usize;
        loop {
            turns += 1;
            self.set_status(MasterStatus::Thinking);

            let stream = self
                .completion
                .stream_completion(CompletionRequest {
                    system: Some(&self.system_prompt),
                    messages: &self.messages,
                    tools: &self.tools,
                })
                .await?;

            let bus = &self.bus;
            let turn = consume_stream(stream, |text| {
                bus.emit(FederationEvent::master_text(text));
            })
            .await?;

            self.messages.extend(turn.to_message());

            if !turn.has_tool_uses() {
                info!(turns, "Master produced final answer");
                return Ok(turn.text);
            }

            let mut results = Vec::with_capacity(turn.tool_uses.len());
            for tool_use in &turn.tool_uses {
                self.set_status(MasterStatus::CallingTool(tool_use.name.clone()));
                let output = self.dispatch.dispatch(&tool_use.name, &tool_use.input);
                results.push(ToolResult::text(&tool_use.id, output));
            }
            debug!(count = results.len(), "Appending operation results");
            self.messages.push(ChatMessage::tool_results(results));
        }
    }

    fn set_status(&mut self, status: MasterStatus) {
        if self.status != status {
            self.bus
                .emit(FederationEvent::status_update(None, status.to_string()));
            self.status = status;
        }
    }
}
