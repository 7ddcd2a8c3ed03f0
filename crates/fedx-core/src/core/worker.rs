//! Worker runner.
//!
//! Each successful delegation launches one tokio task bound to the worker id.
//! The task runs the worker's own completion loop (its template's prompt and
//! tool allowlist, seeded with the task as the only user turn) and always ends
//! by recording a result in [`FederationState`]: the final text, a failure
//! description, or a timeout notice.
//!
//! Executions are tracked by an owned `JoinHandle` plus a
//! `CancellationToken`, so they can be counted, cancelled and joined.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::bus::EventBus;
use crate::core::events::FederationEvent;
use crate::core::state::{FederationState, Intention, WorkerTemplate};
use crate::core::turn::consume_stream;
use crate::providers::{ChatMessage, CompletionRequest, CompletionService};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

/// Default cap on completion round-trips per delegation.
pub const DEFAULT_MAX_WORKER_TURNS: usize = 25;

#[derive(Debug, Clone)]
pub struct WorkerRunnerConfig {
    /// Cap on completion round-trips per delegation.
    pub max_turns: usize,
    /// Per-delegation deadline; `None` disables it.
    pub delegation_timeout: Option<Duration>,
}

impl Default for WorkerRunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_WORKER_TURNS,
            delegation_timeout: None,
        }
    }
}

struct Execution {
    worker_id: String,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct RunnerInner {
    state: Arc<FederationState>,
    bus: Arc<EventBus>,
    completion: Arc<dyn CompletionService>,
    registry: ToolRegistry,
    tool_ctx: ToolContext,
    config: WorkerRunnerConfig,
    executions: Mutex<HashMap<u64, Execution>>,
    next_seq: AtomicU64,
    idle: Notify,
    closed: AtomicBool,
}

enum Outcome {
    Finished(Result<String>),
    Panicked,
    TimedOut(Duration),
    Cancelled,
}

/// Launches and supervises worker executions. Cheap to clone.
#[derive(Clone)]
pub struct WorkerRunner {
    inner: Arc<RunnerInner>,
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("active", &self.active_count())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WorkerRunner {
    pub fn new(
        state: Arc<FederationState>,
        bus: Arc<EventBus>,
        completion: Arc<dyn CompletionService>,
        registry: ToolRegistry,
        tool_ctx: ToolContext,
        config: WorkerRunnerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                state,
                bus,
                completion,
                registry,
                tool_ctx,
                config,
                executions: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                idle: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Starts executing the task currently assigned to `worker_id`.
    ///
    /// The worker must already be WORKING (see [`FederationState::assign`]).
    /// Returns immediately; must be called inside a tokio runtime.
    pub fn launch(&self, worker_id: &str) {
        let Some(worker) = self.inner.state.worker(worker_id) else {
            warn!(worker_id, "Launch requested for unknown worker");
            return;
        };
        let Some(task) = worker.current_task else {
            warn!(worker_id, "Launch requested for worker without a task");
            return;
        };

        if self.inner.closed.load(Ordering::SeqCst) {
            self.finish(
                worker_id,
                "Task failed: worker runner is shut down".to_string(),
                false,
                true,
            );
            return;
        }

        let cancel = CancellationToken::new();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);

        // Insert under the lock so the task cannot deregister before it is registered.
        let mut executions = self.inner.executions.lock();
        let handle = tokio::spawn(self.clone().drive(
            worker_id.to_string(),
            worker.worker_type,
            task,
            cancel.clone(),
            seq,
        ));
        executions.insert(
            seq,
            Execution {
                worker_id: worker_id.to_string(),
                handle,
                cancel,
            },
        );
        debug!(worker_id, seq, active = executions.len(), "Launched worker execution");
    }

    /// Number of executions that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.inner.executions.lock().len()
    }

    /// Returns true if `worker_id` has a running execution.
    pub fn is_running(&self, worker_id: &str) -> bool {
        self.inner
            .executions
            .lock()
            .values()
            .any(|e| e.worker_id == worker_id)
    }

    /// Cancels every running execution for `worker_id`. Returns how many
    /// were signalled.
    pub fn cancel(&self, worker_id: &str) -> usize {
        let executions = self.inner.executions.lock();
        let mut cancelled = 0;
        for execution in executions.values().filter(|e| e.worker_id == worker_id) {
            execution.cancel.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(worker_id, "Cancelled worker execution");
        }
        cancelled
    }

    /// Waits until no execution is running, including executions launched
    /// while waiting (chained delegations).
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refuses new launches, cancels every execution and joins them.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        loop {
            let drained: Vec<Execution> = {
                let mut executions = self.inner.executions.lock();
                executions.drain().map(|(_, e)| e).collect()
            };
            if drained.is_empty() {
                break;
            }
            for execution in &drained {
                execution.cancel.cancel();
            }
            for execution in drained {
                if let Err(e) = execution.handle.await {
                    warn!(worker_id = %execution.worker_id, error = %e, "Worker task join failed");
                }
            }
        }
        self.inner.idle.notify_waiters();
    }

    async fn drive(
        self,
        worker_id: String,
        worker_type: String,
        task: String,
        cancel: CancellationToken,
        seq: u64,
    ) {
        self.inner
            .bus
            .emit(FederationEvent::worker_started(&worker_id, &task));
        info!(worker_id = %worker_id, worker_type = %worker_type, "Worker started");

        let run = AssertUnwindSafe(self.run_task(&worker_id, &worker_type, &task)).catch_unwind();
        let outcome = match self.inner.config.delegation_timeout {
            Some(limit) => tokio::select! {
                biased;
                () = cancel.cancelled() => Outcome::Cancelled,
                result = tokio::time::timeout(limit, run) => match result {
                    Ok(Ok(finished)) => Outcome::Finished(finished),
                    Ok(Err(_)) => Outcome::Panicked,
                    Err(_) => Outcome::TimedOut(limit),
                },
            },
            None => tokio::select! {
                biased;
                () = cancel.cancelled() => Outcome::Cancelled,
                result = run => match result {
                    Ok(finished) => Outcome::Finished(finished),
                    Err(_) => Outcome::Panicked,
                },
            },
        };

        match outcome {
            Outcome::Finished(Ok(text)) => self.finish(&worker_id, text, false, true),
            Outcome::Finished(Err(e)) => self.fail(&worker_id, &format!("{e:#}")),
            Outcome::Panicked => self.fail(&worker_id, "worker execution panicked"),
            Outcome::TimedOut(limit) => {
                warn!(worker_id = %worker_id, secs = limit.as_secs(), "Worker timed out");
                let result = format!("Task timed out after {} seconds", limit.as_secs());
                self.finish(&worker_id, result, true, true);
            }
            Outcome::Cancelled => {
                if self.inner.state.worker(&worker_id).is_some() {
                    self.finish(&worker_id, "Task cancelled".to_string(), false, false);
                } else {
                    debug!(worker_id = %worker_id, "Cancelled execution of a removed worker");
                }
            }
        }

        let removed = self.inner.executions.lock().remove(&seq).is_some();
        if removed {
            self.inner.idle.notify_waiters();
        }
    }

    /// The worker's completion loop.
    async fn run_task(&self, worker_id: &str, worker_type: &str, task: &str) -> Result<String> {
        let inner = &self.inner;
        let template: WorkerTemplate = inner
            .state
            .template(worker_type)
            .ok_or_else(|| anyhow!("Unknown worker type: {worker_type}"))?;
        let tools = inner
            .registry
            .tools_from_names(template.allowed_tools.iter().map(String::as_str));

        let mut messages = vec![ChatMessage::user(task)];

        for turn_index in 0..inner.config.max_turns {
            let stream = inner
                .completion
                .stream_completion(CompletionRequest {
                    system: Some(&template.system_prompt),
                    messages: &messages,
                    tools: &tools,
                })
                .await?;

            let turn = consume_stream(stream, |text| {
                inner.bus.emit(FederationEvent::worker_text(worker_id, text));
            })
            .await?;

            if !turn.has_tool_uses() {
                debug!(worker_id, turns = turn_index + 1, "Worker produced final answer");
                return Ok(turn.text);
            }

            messages.extend(turn.to_message());

            let mut results = Vec::with_capacity(turn.tool_uses.len());
            for tool_use in &turn.tool_uses {
                inner.bus.emit(FederationEvent::worker_tool_call(
                    worker_id,
                    &tool_use.name,
                    &tool_use.input,
                ));
                let output = inner
                    .registry
                    .execute_tool(
                        &tool_use.name,
                        &tool_use.input,
                        &inner.tool_ctx,
                        &template.allowed_tools,
                    )
                    .await;
                if let Some(code) = output.error_code() {
                    debug!(worker_id, tool = %tool_use.name, code, "Worker tool failed");
                }
                results.push(ToolResult::from_output(&tool_use.id, &output));
            }
            messages.push(ChatMessage::tool_results(results));
        }

        Ok(format!(
            "Stopped after {} turns without a final answer.",
            inner.config.max_turns
        ))
    }

    fn fail(&self, worker_id: &str, error: &str) {
        warn!(worker_id, %error, "Worker execution failed");
        self.inner
            .bus
            .emit(FederationEvent::worker_error(worker_id, error));
        self.finish(worker_id, format!("Task failed: {error}"), false, true);
    }

    /// Records the result and applies the delegation's intention.
    fn finish(&self, worker_id: &str, result: String, timed_out: bool, route: bool) {
        let worker = match self.inner.state.complete(worker_id, &result) {
            Ok(worker) => worker,
            Err(e) => {
                debug!(worker_id, error = %e, "Dropping result for worker");
                return;
            }
        };

        let intention = worker.intention.unwrap_or(Intention::ReturnToUser);
        self.inner
            .bus
            .emit(FederationEvent::worker_done(worker_id, &result, timed_out));
        self.inner.bus.emit(FederationEvent::delegation_completed(
            worker_id,
            &result,
            intention.label(),
            timed_out,
        ));
        info!(worker_id, timed_out, "Worker done");

        if route && let Intention::PassToAgent { target, instructions } = intention {
            self.forward(worker_id, &target, &instructions, &result);
        }
    }

    /// Chained delegation: hands `result` to `target` as a new task.
    fn forward(&self, source: &str, target: &str, instructions: &str, result: &str) {
        let instructions = instructions.trim();
        let task = if instructions.is_empty() {
            result.to_string()
        } else {
            format!("{instructions}\n\n{result}")
        };

        match self
            .inner
            .state
            .assign(target, &task, Intention::ReturnToUser)
        {
            Ok(_) => {
                self.inner.bus.emit(FederationEvent::delegation_started(
                    target,
                    &task,
                    Intention::ReturnToUser.label(),
                ));
                self.inner.bus.emit(FederationEvent::status_update(
                    Some(source),
                    format!("Forwarded result of {source} to {target}"),
                ));
                self.launch(target);
            }
            Err(e) => {
                warn!(source, target, error = %e, "Could not forward result");
                self.inner.bus.emit(FederationEvent::status_update(
                    Some(source),
                    format!("Could not forward result of {source} to {target}: {e}"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::core::events::EventKind;
    use crate::core::state::WorkerStatus;
    use crate::providers::StreamEvent;
    use crate::providers::scripted::{ScriptedCompletion, last_tool_result, text_events, tool_call};

    struct Harness {
        _temp: TempDir,
        root: std::path::PathBuf,
        state: Arc<FederationState>,
        events: Arc<Mutex<Vec<FederationEvent>>>,
        runner: WorkerRunner,
    }

    fn harness(completion: Arc<dyn CompletionService>, config: WorkerRunnerConfig) -> Harness {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let state = Arc::new(FederationState::with_default_templates());
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |ev| sink.lock().push(ev.clone()));

        let runner = WorkerRunner::new(
            Arc::clone(&state),
            bus,
            completion,
            ToolRegistry::builtins(),
            ToolContext::new(root.clone(), None),
            config,
        );

        Harness {
            _temp: temp,
            root,
            state,
            events,
            runner,
        }
    }

    fn kinds(events: &Arc<Mutex<Vec<FederationEvent>>>) -> Vec<EventKind> {
        events.lock().iter().map(|e| e.kind).collect()
    }

    #[tokio::test]
    async fn test_worker_writes_file_and_completes() {
        let completion = ScriptedCompletion::new(|req, _| {
            if req.messages.len() == 1 {
                Ok(tool_call(
                    "toolu_1",
                    "write_file",
                    &json!({"path": "haiku.txt", "content": "old pond"}),
                ))
            } else {
                Ok(text_events("Wrote the haiku to haiku.txt"))
            }
        });
        let h = harness(completion.clone(), WorkerRunnerConfig::default());

        let worker = h.state.spawn("general").unwrap();
        h.state
            .assign(&worker.id, "write a haiku to haiku.txt", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        assert_eq!(
            std::fs::read_to_string(h.root.join("haiku.txt")).unwrap(),
            "old pond"
        );
        let done = h.state.worker(&worker.id).unwrap();
        assert_eq!(done.status, WorkerStatus::Done);
        assert_eq!(done.result.as_deref(), Some("Wrote the haiku to haiku.txt"));

        let requests = completion.requests();
        assert_eq!(
            requests[0].system.as_deref(),
            Some("You are a helpful worker agent. Complete tasks thoroughly and clearly.")
        );
        assert_eq!(
            requests[0].tool_names,
            vec!["read_file", "write_file", "search_files"]
        );
        assert_eq!(
            last_tool_result(&requests[1]).as_deref(),
            Some("Successfully wrote 8 bytes to haiku.txt")
        );

        let kinds = kinds(&h.events);
        assert_eq!(kinds.first(), Some(&EventKind::WorkerStarted));
        assert!(kinds.contains(&EventKind::WorkerToolCall));
        assert!(kinds.contains(&EventKind::WorkerText));
        let done_pos = kinds.iter().position(|k| *k == EventKind::WorkerDone).unwrap();
        assert_eq!(kinds[done_pos + 1], EventKind::DelegationCompleted);
        assert_eq!(h.runner.active_count(), 0);
        h.state.assert_invariants();
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_result_text() {
        let completion =
            ScriptedCompletion::new(|_, _| Err(anyhow!("connection refused by upstream")));
        let h = harness(completion, WorkerRunnerConfig::default());

        let worker = h.state.spawn("coder").unwrap();
        h.state
            .assign(&worker.id, "do it", Intention::ReviewByMaster)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        let done = h.state.worker(&worker.id).unwrap();
        assert_eq!(done.status, WorkerStatus::Done);
        assert_eq!(
            done.result.as_deref(),
            Some("Task failed: connection refused by upstream")
        );
        assert!(kinds(&h.events).contains(&EventKind::WorkerError));
        assert_eq!(h.state.completed_len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_becomes_result_text() {
        let completion = ScriptedCompletion::new(|_, _| {
            Ok(vec![StreamEvent::Error {
                error_type: "overloaded_error".into(),
                message: "Overloaded".into(),
            }])
        });
        let h = harness(completion, WorkerRunnerConfig::default());

        let worker = h.state.spawn("general").unwrap();
        h.state
            .assign(&worker.id, "task", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        assert_eq!(
            h.state.worker(&worker.id).unwrap().result.as_deref(),
            Some("Task failed: overloaded_error: Overloaded")
        );
    }

    #[tokio::test]
    async fn test_disallowed_tool_is_reported_to_worker() {
        let completion = ScriptedCompletion::new(|req, _| {
            if req.messages.len() == 1 {
                Ok(tool_call(
                    "toolu_1",
                    "write_file",
                    &json!({"path": "x.txt", "content": "x"}),
                ))
            } else {
                Ok(text_events(&last_tool_result(req).unwrap_or_default()))
            }
        });
        let h = harness(completion, WorkerRunnerConfig::default());

        let worker = h.state.spawn("researcher").unwrap();
        h.state
            .assign(&worker.id, "try writing", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        let result = h.state.worker(&worker.id).unwrap().result.unwrap();
        assert!(result.starts_with("Error [unknown_tool]"), "{result}");
        assert!(!h.root.join("x.txt").exists());
    }

    #[tokio::test]
    async fn test_turn_cap_ends_runaway_loop() {
        let completion = ScriptedCompletion::new(|_, call| {
            Ok(tool_call(
                &format!("toolu_{call}"),
                "search_files",
                &json!({"pattern": "*"}),
            ))
        });
        let config = WorkerRunnerConfig {
            max_turns: 3,
            delegation_timeout: None,
        };
        let h = harness(completion.clone(), config);

        let worker = h.state.spawn("general").unwrap();
        h.state
            .assign(&worker.id, "loop forever", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        assert_eq!(completion.requests().len(), 3);
        assert_eq!(
            h.state.worker(&worker.id).unwrap().result.as_deref(),
            Some("Stopped after 3 turns without a final answer.")
        );
    }

    /// Completion service whose stream never yields.
    struct Stalled;

    impl CompletionService for Stalled {
        fn stream_completion<'a>(
            &'a self,
            _request: CompletionRequest<'a>,
        ) -> futures_util::future::BoxFuture<'a, Result<crate::providers::ProviderStream>> {
            Box::pin(async {
                let stream: crate::providers::ProviderStream = Box::pin(
                    futures_util::stream::pending::<crate::providers::ProviderResult<StreamEvent>>(),
                );
                Ok(stream)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_completes_with_timeout_result() {
        let config = WorkerRunnerConfig {
            max_turns: DEFAULT_MAX_WORKER_TURNS,
            delegation_timeout: Some(Duration::from_secs(5)),
        };
        let h = harness(Arc::new(Stalled), config);

        let worker = h.state.spawn("general").unwrap();
        h.state
            .assign(&worker.id, "never ends", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        h.runner.wait_idle().await;

        let done = h.state.worker(&worker.id).unwrap();
        assert_eq!(done.status, WorkerStatus::Done);
        assert_eq!(done.result.as_deref(), Some("Task timed out after 5 seconds"));

        let events = h.events.lock();
        let done_event = events
            .iter()
            .find(|e| e.kind == EventKind::WorkerDone)
            .unwrap();
        assert_eq!(done_event.payload["timed_out"], true);
    }

    #[tokio::test]
    async fn test_cancel_then_terminate_leaves_no_record() {
        let h = harness(Arc::new(Stalled), WorkerRunnerConfig::default());

        let worker = h.state.spawn("general").unwrap();
        h.state
            .assign(&worker.id, "never ends", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&worker.id);
        assert!(h.runner.is_running(&worker.id));

        h.state.terminate(&worker.id).unwrap();
        assert_eq!(h.runner.cancel(&worker.id), 1);
        h.runner.wait_idle().await;

        assert!(h.state.worker(&worker.id).is_none());
        assert_eq!(h.state.completed_len(), 0);
        assert!(!kinds(&h.events).contains(&EventKind::WorkerDone));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_refuses_new_launches() {
        let h = harness(Arc::new(Stalled), WorkerRunnerConfig::default());

        let first = h.state.spawn("general").unwrap();
        h.state
            .assign(&first.id, "never ends", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&first.id);

        h.runner.shutdown().await;
        assert_eq!(h.runner.active_count(), 0);
        assert_eq!(
            h.state.worker(&first.id).unwrap().result.as_deref(),
            Some("Task cancelled")
        );

        let second = h.state.spawn("general").unwrap();
        h.state
            .assign(&second.id, "too late", Intention::ReturnToUser)
            .unwrap();
        h.runner.launch(&second.id);
        assert_eq!(h.runner.active_count(), 0);
        assert_eq!(
            h.state.worker(&second.id).unwrap().result.as_deref(),
            Some("Task failed: worker runner is shut down")
        );
    }

    #[tokio::test]
    async fn test_pass_to_agent_forwards_result_to_target() {
        let completion = ScriptedCompletion::new(|req, _| {
            let task = match &req.messages[0].content {
                crate::providers::MessageContent::Text(t) => t.clone(),
                crate::providers::MessageContent::Blocks(_) => String::new(),
            };
            if task.starts_with("Summarize") {
                Ok(text_events("summary of: draft text"))
            } else {
                Ok(text_events("draft text"))
            }
        });
        let h = harness(completion.clone(), WorkerRunnerConfig::default());

        let source = h.state.spawn("researcher").unwrap();
        let target = h.state.spawn("general").unwrap();
        h.state
            .assign(
                &source.id,
                "draft something",
                Intention::PassToAgent {
                    target: target.id.clone(),
                    instructions: "Summarize the following.".to_string(),
                },
            )
            .unwrap();
        h.runner.launch(&source.id);
        h.runner.wait_idle().await;

        let drained = h.state.drain_completed();
        let ids: Vec<&str> = drained.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec![source.id.as_str(), target.id.as_str()]);
        assert_eq!(drained[1].result.as_deref(), Some("summary of: draft text"));
        assert_eq!(
            drained[1].current_task.as_deref(),
            Some("Summarize the following.\n\ndraft text")
        );
        assert_eq!(drained[1].intention, Some(Intention::ReturnToUser));

        let events = h.events.lock();
        assert!(events.iter().any(|e| e.kind == EventKind::StatusUpdate
            && e.payload_str("message").is_some_and(|m| m.starts_with("Forwarded result"))));
    }

    #[tokio::test]
    async fn test_forward_to_busy_target_reports_status() {
        let completion = ScriptedCompletion::new(|_, _| Ok(text_events("source result")));
        let h = harness(completion, WorkerRunnerConfig::default());

        let source = h.state.spawn("general").unwrap();
        let target = h.state.spawn("general").unwrap();
        h.state
            .assign(
                &source.id,
                "produce",
                Intention::PassToAgent {
                    target: target.id.clone(),
                    instructions: "Use this".to_string(),
                },
            )
            .unwrap();
        // Target is busy with its own task, so forwarding must fail.
        h.state
            .assign(&target.id, "hold", Intention::ReviewByMaster)
            .unwrap();

        h.runner.launch(&source.id);
        h.runner.wait_idle().await;

        let src = h.state.worker(&source.id).unwrap();
        assert_eq!(src.result.as_deref(), Some("source result"));
        assert_eq!(h.state.completed_ids(), vec![source.id.clone()]);

        let events = h.events.lock();
        assert!(events.iter().any(|e| e.kind == EventKind::StatusUpdate
            && e.payload_str("message").is_some_and(|m| m.starts_with("Could not forward"))));
    }
}
