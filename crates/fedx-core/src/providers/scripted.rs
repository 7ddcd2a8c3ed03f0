//! In-process completion service for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::{
    ChatMessage, CompletionRequest, CompletionService, ContentBlockType, ProviderStream,
    StreamEvent, Usage,
};

/// Snapshot of a request as seen by the scripted service.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

type Responder = dyn Fn(&RecordedRequest, usize) -> Result<Vec<StreamEvent>> + Send + Sync;

/// Answers each request by calling a responder with the request and the
/// zero-based call number.
pub(crate) struct ScriptedCompletion {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedCompletion {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RecordedRequest, usize) -> Result<Vec<StreamEvent>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl CompletionService for ScriptedCompletion {
    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<ProviderStream>> {
        let recorded = RecordedRequest {
            system: request.system.map(str::to_string),
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        };
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(recorded.clone());
        let result = (self.responder)(&recorded, call);

        Box::pin(async move {
            let events = result?;
            let stream: ProviderStream =
                Box::pin(futures_util::stream::iter(events.into_iter().map(Ok)));
            Ok(stream)
        })
    }
}

fn message_start() -> StreamEvent {
    StreamEvent::MessageStart {
        model: "scripted".to_string(),
        usage: Usage::default(),
    }
}

/// A plain text turn, split into two deltas.
pub(crate) fn text_events(text: &str) -> Vec<StreamEvent> {
    let split = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
    let (head, tail) = text.split_at(split);
    vec![
        message_start(),
        StreamEvent::ContentBlockStart {
            index: 0,
            block_type: ContentBlockType::Text,
            id: None,
            name: None,
        },
        StreamEvent::TextDelta {
            index: 0,
            text: head.to_string(),
        },
        StreamEvent::TextDelta {
            index: 0,
            text: tail.to_string(),
        },
        StreamEvent::ContentBlockCompleted { index: 0 },
        StreamEvent::MessageDelta {
            stop_reason: Some("end_turn".to_string()),
            usage: None,
        },
        StreamEvent::MessageCompleted,
    ]
}

/// A single tool call whose arguments arrive as `fragments`.
pub(crate) fn tool_events(id: &str, name: &str, fragments: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![
        message_start(),
        StreamEvent::ContentBlockStart {
            index: 0,
            block_type: ContentBlockType::ToolUse,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
        },
    ];
    events.extend(fragments.iter().map(|f| StreamEvent::InputJsonDelta {
        index: 0,
        partial_json: (*f).to_string(),
    }));
    events.push(StreamEvent::ContentBlockCompleted { index: 0 });
    events.push(StreamEvent::MessageDelta {
        stop_reason: Some("tool_use".to_string()),
        usage: None,
    });
    events.push(StreamEvent::MessageCompleted);
    events
}

/// A single tool call with complete JSON arguments.
pub(crate) fn tool_call(id: &str, name: &str, input: &serde_json::Value) -> Vec<StreamEvent> {
    tool_events(id, name, &[&input.to_string()])
}

/// Returns the text of the last tool result in the transcript, if any.
pub(crate) fn last_tool_result(request: &RecordedRequest) -> Option<String> {
    request.messages.iter().rev().find_map(|m| match &m.content {
        super::MessageContent::Blocks(blocks) => blocks.iter().rev().find_map(|b| match b {
            super::ChatContentBlock::ToolResult(r) => Some(r.content.clone()),
            _ => None,
        }),
        super::MessageContent::Text(_) => None,
    })
}
