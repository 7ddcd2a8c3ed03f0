//! Console rendering of federation events.
//!
//! # Output contract
//! - `master_text` → stdout
//! - worker activity, operation calls and errors → stderr
//! - with `json_events`, every event is written to stderr as one JSON line

use std::collections::HashMap;
use std::io::{Stderr, Stdout, Write, stderr, stdout};
use std::time::Instant;

use fedx_core::core::bus::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, EventBus, FederationEventRx, SubscriptionId,
};
use fedx_core::core::events::{EventKind, FederationEvent};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Emit raw events as JSON lines instead of formatted activity.
    pub json_events: bool,
    /// Stream worker text deltas to stderr.
    pub show_worker_text: bool,
}

pub struct ExecRenderer {
    stdout: Stdout,
    stderr: Stderr,
    options: RenderOptions,
    /// Whether stdout needs a newline before the next stderr line.
    needs_final_newline: bool,
    /// Worker id → start time, for durations on `worker_done`.
    started: HashMap<String, Instant>,
    /// Worker id whose text is currently streaming to stderr.
    streaming_worker: Option<String>,
}

impl ExecRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            stdout: stdout(),
            stderr: stderr(),
            options,
            needs_final_newline: false,
            started: HashMap::new(),
            streaming_worker: None,
        }
    }

    pub fn handle_event(&mut self, event: &FederationEvent) {
        if self.options.json_events {
            if let Ok(line) = serde_json::to_string(event) {
                let _ = writeln!(self.stderr, "{line}");
            }
            return;
        }

        let worker = event.worker_id.as_deref().unwrap_or("-");
        match event.kind {
            EventKind::MasterText => {
                if let Some(text) = event.text().filter(|t| !t.is_empty()) {
                    let _ = write!(self.stdout, "{text}");
                    let _ = self.stdout.flush();
                    self.needs_final_newline = true;
                }
            }
            EventKind::MasterToolCall => {
                let name = event.payload_str("tool_name").unwrap_or("?");
                let input = event
                    .payload
                    .get("tool_input")
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.line(&format!("⚙ {name} {}", truncate(&input, 120)));
            }
            EventKind::MasterToolResult => {
                let result = event.payload_str("result").unwrap_or("");
                let first = result.lines().next().unwrap_or("");
                self.line(&format!("  ↳ {}", truncate(first, 120)));
            }
            EventKind::MasterDone => self.finish(),
            EventKind::WorkerSpawned => {
                let agent_type = event.payload_str("agent_type").unwrap_or("?");
                self.line(&format!("[{worker}] spawned ({agent_type})"));
            }
            EventKind::WorkerStarted => {
                self.started.insert(worker.to_string(), Instant::now());
                let task = event.payload_str("task").unwrap_or("");
                self.line(&format!("[{worker}] started: {}", truncate(task, 80)));
            }
            EventKind::WorkerText => {
                if self.options.show_worker_text
                    && let Some(text) = event.text()
                {
                    if self.streaming_worker.as_deref() != Some(worker) {
                        self.line(&format!("[{worker}] …"));
                        self.streaming_worker = Some(worker.to_string());
                    }
                    let _ = write!(self.stderr, "{text}");
                    let _ = self.stderr.flush();
                }
            }
            EventKind::WorkerToolCall => {
                let name = event.payload_str("tool_name").unwrap_or("?");
                let input = event
                    .payload
                    .get("tool_input")
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.line(&format!("[{worker}] {name} {}", truncate(&input, 100)));
            }
            EventKind::WorkerDone => {
                let elapsed = self
                    .started
                    .remove(worker)
                    .map(|start| format!(" ({:.1}s)", start.elapsed().as_secs_f64()))
                    .unwrap_or_default();
                let timed_out = event
                    .payload
                    .get("timed_out")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                let label = if timed_out { "timed out" } else { "done" };
                self.line(&format!("[{worker}] {label}{elapsed}"));
            }
            EventKind::WorkerError => {
                let error = event.payload_str("error").unwrap_or("");
                self.line(&format!("[{worker}] error: {error}"));
            }
            EventKind::WorkerTerminated => self.line(&format!("[{worker}] terminated")),
            EventKind::DelegationStarted => {
                let intention = event.payload_str("intention").unwrap_or("?");
                self.line(&format!("[{worker}] delegated ({intention})"));
            }
            EventKind::DelegationCompleted => {}
            EventKind::StatusUpdate => {
                // Master transitions are implied by the text stream.
                if event.worker_id.is_some()
                    && let Some(message) = event.payload_str("message")
                {
                    self.line(&format!("[{worker}] {message}"));
                }
            }
        }
    }

    /// Writes one activity line to stderr, closing any open stdout line first.
    fn line(&mut self, text: &str) {
        if self.needs_final_newline {
            let _ = writeln!(self.stdout);
            let _ = self.stdout.flush();
            self.needs_final_newline = false;
        }
        if self.streaming_worker.take().is_some() {
            let _ = writeln!(self.stderr);
        }
        let _ = writeln!(self.stderr, "{text}");
    }

    /// Prints a final newline to stdout if needed.
    pub fn finish(&mut self) {
        if self.needs_final_newline {
            let _ = writeln!(self.stdout);
            let _ = self.stdout.flush();
            self.needs_final_newline = false;
        }
    }
}

/// Subscribes a renderer channel to `bus`.
///
/// Worker text deltas only enter the channel when they will be shown, so
/// they cannot crowd out the master's answer.
pub fn subscribe_renderer(
    bus: &EventBus,
    options: RenderOptions,
) -> (SubscriptionId, FederationEventRx) {
    let wants = move |event: &FederationEvent| {
        options.json_events || options.show_worker_text || event.kind != EventKind::WorkerText
    };
    bus.subscribe_channel_filtered(DEFAULT_EVENT_CHANNEL_CAPACITY, wants)
}

/// Spawns a task that renders events until the channel closes.
pub fn spawn_renderer_task(mut rx: FederationEventRx, options: RenderOptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ExecRenderer::new(options);
        while let Some(event) = rx.recv().await {
            renderer.handle_event(&event);
        }
        renderer.finish();
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut out: String = single_line.chars().take(max_chars).collect();
    out.push('…');
    out
}
