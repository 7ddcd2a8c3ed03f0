//! Master-side dispatch table.
//!
//! The master model manages workers through a closed set of operations.
//! Every handler returns text: failures are rendered as result text so the
//! model can react within the conversation.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::bus::EventBus;
use crate::core::events::FederationEvent;
use crate::core::state::{FederationState, Intention, Worker};
use crate::core::worker::WorkerRunner;
use crate::tools::ToolDefinition;

/// Operations exposed to the master model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterOperation {
    ListWorkerTypes,
    ListWorkers,
    GetWorkerDetail,
    SpawnWorker,
    Delegate,
    GetCompleted,
    TerminateWorker,
}

impl MasterOperation {
    pub const ALL: [MasterOperation; 7] = [
        MasterOperation::ListWorkerTypes,
        MasterOperation::ListWorkers,
        MasterOperation::GetWorkerDetail,
        MasterOperation::SpawnWorker,
        MasterOperation::Delegate,
        MasterOperation::GetCompleted,
        MasterOperation::TerminateWorker,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "list_worker_types" => Some(MasterOperation::ListWorkerTypes),
            "list_workers" => Some(MasterOperation::ListWorkers),
            "get_worker_detail" => Some(MasterOperation::GetWorkerDetail),
            "spawn_worker" => Some(MasterOperation::SpawnWorker),
            "delegate" => Some(MasterOperation::Delegate),
            "get_completed" => Some(MasterOperation::GetCompleted),
            "terminate_worker" => Some(MasterOperation::TerminateWorker),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MasterOperation::ListWorkerTypes => "list_worker_types",
            MasterOperation::ListWorkers => "list_workers",
            MasterOperation::GetWorkerDetail => "get_worker_detail",
            MasterOperation::SpawnWorker => "spawn_worker",
            MasterOperation::Delegate => "delegate",
            MasterOperation::GetCompleted => "get_completed",
            MasterOperation::TerminateWorker => "terminate_worker",
        }
    }

    /// Schema catalog entry advertised to the completion service.
    pub fn definition(self) -> ToolDefinition {
        let no_input = json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        });
        let worker_id_only = json!({
            "type": "object",
            "properties": {
                "worker_id": {
                    "type": "string",
                    "description": "ID of the worker"
                }
            },
            "required": ["worker_id"],
            "additionalProperties": false
        });

        let (description, input_schema) = match self {
            MasterOperation::ListWorkerTypes => (
                "List the available worker templates with their descriptions and tools.",
                no_input,
            ),
            MasterOperation::ListWorkers => (
                "List all live workers with their type and status.",
                no_input,
            ),
            MasterOperation::GetWorkerDetail => (
                "Show details for one worker: type, status, tools, current task and last result.",
                worker_id_only,
            ),
            MasterOperation::SpawnWorker => (
                "Create a new idle worker from a template. Returns the new worker's ID.",
                json!({
                    "type": "object",
                    "properties": {
                        "worker_type": {
                            "type": "string",
                            "description": "Template name (see list_worker_types)"
                        }
                    },
                    "required": ["worker_type"],
                    "additionalProperties": false
                }),
            ),
            MasterOperation::Delegate => (
                "Assign a task to an idle worker. Returns immediately; the worker runs in the \
                 background. Collect results later with get_completed.",
                json!({
                    "type": "object",
                    "properties": {
                        "worker_id": {
                            "type": "string",
                            "description": "ID of an idle worker"
                        },
                        "task": {
                            "type": "string",
                            "description": "Complete, self-contained task description"
                        },
                        "intention": {
                            "type": "string",
                            "enum": ["return_to_user", "review_by_master", "pass_to_agent"],
                            "description": "What to do with the result (default return_to_user)"
                        },
                        "target_worker_id": {
                            "type": "string",
                            "description": "Worker that receives the result (pass_to_agent only)"
                        },
                        "instructions": {
                            "type": "string",
                            "description": "Instructions for the target worker (pass_to_agent only)"
                        }
                    },
                    "required": ["worker_id", "task"],
                    "additionalProperties": false
                }),
            ),
            MasterOperation::GetCompleted => (
                "Collect results of finished tasks. Each result is returned once; the workers become idle again.",
                no_input,
            ),
            MasterOperation::TerminateWorker => (
                "Remove a worker, cancelling any task it is running.",
                worker_id_only,
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }

    pub fn all_definitions() -> Vec<ToolDefinition> {
        Self::ALL.iter().map(|op| op.definition()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct WorkerIdInput {
    worker_id: String,
}

#[derive(Debug, Deserialize)]
struct SpawnInput {
    worker_type: String,
}

#[derive(Debug, Deserialize)]
struct DelegateInput {
    worker_id: String,
    task: String,
    #[serde(default)]
    intention: Option<String>,
    #[serde(default)]
    target_worker_id: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
}

impl DelegateInput {
    fn intention(&self) -> Result<Intention, String> {
        match self.intention.as_deref().map(str::trim) {
            None | Some("" | "return_to_user") => Ok(Intention::ReturnToUser),
            Some("review_by_master") => Ok(Intention::ReviewByMaster),
            Some("pass_to_agent") => {
                let target = self
                    .target_worker_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or("pass_to_agent requires target_worker_id")?;
                Ok(Intention::PassToAgent {
                    target: target.to_string(),
                    instructions: self.instructions.clone().unwrap_or_default(),
                })
            }
            Some(other) => Err(format!(
                "unknown intention '{other}' (expected return_to_user, review_by_master or pass_to_agent)"
            )),
        }
    }
}

/// Handlers for [`MasterOperation`]s over the shared federation.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    state: Arc<FederationState>,
    bus: Arc<EventBus>,
    runner: WorkerRunner,
}

impl DispatchTable {
    pub fn new(state: Arc<FederationState>, bus: Arc<EventBus>, runner: WorkerRunner) -> Self {
        Self { state, bus, runner }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        MasterOperation::all_definitions()
    }

    /// Runs the operation named `name` and returns its text result.
    ///
    /// Emits `master_tool_call` before and `master_tool_result` after,
    /// including for unknown names.
    pub fn dispatch(&self, name: &str, input: &Value) -> String {
        self.bus
            .emit(FederationEvent::master_tool_call(name, input));

        let result = match MasterOperation::from_name(name) {
            Some(op) => self.run(op, input),
            None => {
                let available: Vec<&str> =
                    MasterOperation::ALL.iter().map(|op| op.name()).collect();
                format!(
                    "Unknown operation: {name}. Available operations: {}",
                    available.join(", ")
                )
            }
        };
        debug!(operation = name, "Dispatched master operation");

        self.bus
            .emit(FederationEvent::master_tool_result(name, &result));
        result
    }

    fn run(&self, op: MasterOperation, input: &Value) -> String {
        match op {
            MasterOperation::ListWorkerTypes => self.list_worker_types(),
            MasterOperation::ListWorkers => self.list_workers(),
            MasterOperation::GetWorkerDetail => match parse::<WorkerIdInput>(op, input) {
                Ok(input) => self.worker_detail(&input.worker_id),
                Err(msg) => msg,
            },
            MasterOperation::SpawnWorker => match parse::<SpawnInput>(op, input) {
                Ok(input) => self.spawn_worker(&input.worker_type),
                Err(msg) => msg,
            },
            MasterOperation::Delegate => match parse::<DelegateInput>(op, input) {
                Ok(input) => self.delegate(&input),
                Err(msg) => msg,
            },
            MasterOperation::GetCompleted => self.get_completed(),
            MasterOperation::TerminateWorker => match parse::<WorkerIdInput>(op, input) {
                Ok(input) => self.terminate_worker(&input.worker_id),
                Err(msg) => msg,
            },
        }
    }

    fn list_worker_types(&self) -> String {
        let templates = self.state.templates();
        if templates.is_empty() {
            return "No worker templates are registered.".to_string();
        }
        let mut out = String::from("Available worker templates:");
        for template in templates {
            let tools = if template.allowed_tools.is_empty() {
                "none".to_string()
            } else {
                template.allowed_tools.join(", ")
            };
            let _ = write!(
                out,
                "\n- {}: {}\n  Tools: {tools}",
                template.name, template.description
            );
        }
        out
    }

    fn list_workers(&self) -> String {
        let workers = self.state.workers();
        if workers.is_empty() {
            return "No workers running.".to_string();
        }
        let mut out = String::from("Running workers:");
        for worker in workers {
            let _ = write!(
                out,
                "\n- {} ({}) Status: {}",
                worker.id, worker.worker_type, worker.status
            );
            if let Some(task) = &worker.current_task {
                let _ = write!(out, "\n  Task: {}", truncate(task, 80));
            }
        }
        out
    }

    fn worker_detail(&self, worker_id: &str) -> String {
        let Some(worker) = self.state.worker(worker_id) else {
            return format!("Error: Worker not found: {worker_id}");
        };
        let tools = self
            .state
            .template(&worker.worker_type)
            .map(|t| t.allowed_tools.join(", "))
            .unwrap_or_default();

        let mut out = format!(
            "Worker: {}\nType: {}\nStatus: {}\nCreated: {}\nTools: {}",
            worker.id,
            worker.worker_type,
            worker.status,
            worker.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            if tools.is_empty() { "none" } else { tools.as_str() },
        );
        if self.runner.is_running(&worker.id) {
            out.push_str("\nExecution: running");
        }
        if let Some(task) = &worker.current_task {
            let _ = write!(out, "\nCurrent task: {task}");
        }
        if let Some(intention) = &worker.intention {
            let _ = write!(out, "\nIntention: {intention}");
        }
        if let Some(result) = &worker.result {
            let _ = write!(out, "\nLast result: {}", truncate(result, 500));
        }
        out
    }

    fn spawn_worker(&self, worker_type: &str) -> String {
        match self.state.spawn(worker_type) {
            Ok(worker) => {
                self.bus
                    .emit(FederationEvent::worker_spawned(&worker.id, &worker.worker_type));
                format!(
                    "Spawned worker '{}' with ID: {}",
                    worker.worker_type, worker.id
                )
            }
            Err(e) => {
                let known: Vec<String> = self.state.templates().into_iter().map(|t| t.name).collect();
                format!("Error: {e}. Available types: {}", known.join(", "))
            }
        }
    }

    fn delegate(&self, input: &DelegateInput) -> String {
        let task = input.task.trim();
        if task.is_empty() {
            return "Invalid input for delegate: task must not be empty".to_string();
        }
        let intention = match input.intention() {
            Ok(intention) => intention,
            Err(reason) => return format!("Invalid input for delegate: {reason}"),
        };
        let label = intention.label();

        match self.state.assign(&input.worker_id, task, intention) {
            Ok(worker) => {
                self.bus.emit(FederationEvent::delegation_started(
                    &worker.id,
                    task,
                    label,
                ));
                self.runner.launch(&worker.id);
                format!(
                    "Delegated task to worker {} (intention: {label}). The worker is running in the background; call get_completed to collect the result.",
                    worker.id
                )
            }
            Err(e) => format!("Error: {e}"),
        }
    }

    /// Drains the completion queue. Each result is reported exactly once.
    fn get_completed(&self) -> String {
        let completed = self.state.drain_completed();
        if completed.is_empty() {
            return "No completed tasks yet.".to_string();
        }
        let mut out = format!("Completed tasks ({}):", completed.len());
        for worker in &completed {
            out.push_str("\n\n");
            out.push_str(&format_completed(worker));
        }
        out
    }

    fn terminate_worker(&self, worker_id: &str) -> String {
        match self.state.terminate(worker_id) {
            Ok(worker) => {
                self.runner.cancel(&worker.id);
                self.bus.emit(FederationEvent::worker_terminated(&worker.id));
                format!("Terminated worker {} ({})", worker.id, worker.worker_type)
            }
            Err(e) => format!("Error: {e}"),
        }
    }
}

fn parse<T: DeserializeOwned>(op: MasterOperation, input: &Value) -> Result<T, String> {
    // Models sometimes send `null` for operations without arguments.
    let input = if input.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        input.clone()
    };
    serde_json::from_value(input).map_err(|e| format!("Invalid input for {}: {e}", op.name()))
}

fn format_completed(worker: &Worker) -> String {
    let header = match &worker.intention {
        Some(Intention::ReviewByMaster) => "[Review before responding]".to_string(),
        Some(Intention::PassToAgent { target, .. }) => format!("[Forwarded to {target}]"),
        Some(Intention::ReturnToUser) | None => "[Deliver to user]".to_string(),
    };
    format!(
        "{header} Worker {} ({})\nTask: {}\nResult:\n{}",
        worker.id,
        worker.worker_type,
        worker.current_task.as_deref().unwrap_or(""),
        worker.result.as_deref().unwrap_or(""),
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use crate::core::events::EventKind;
    use crate::core::state::WorkerStatus;
    use crate::core::worker::WorkerRunnerConfig;
    use crate::providers::CompletionService;
    use crate::providers::scripted::{ScriptedCompletion, text_events};
    use crate::tools::{ToolContext, ToolRegistry};

    struct Harness {
        _temp: TempDir,
        state: Arc<FederationState>,
        runner: WorkerRunner,
        events: Arc<Mutex<Vec<FederationEvent>>>,
        table: DispatchTable,
    }

    fn harness(completion: Arc<dyn CompletionService>) -> Harness {
        let temp = TempDir::new().unwrap();
        let state = Arc::new(FederationState::with_default_templates());
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe(move |ev| sink.lock().push(ev.clone()));
        let runner = WorkerRunner::new(
            Arc::clone(&state),
            Arc::clone(&bus),
            completion,
            ToolRegistry::builtins(),
            ToolContext::new(temp.path().to_path_buf(), None),
            WorkerRunnerConfig::default(),
        );
        let table = DispatchTable::new(Arc::clone(&state), bus, runner.clone());
        Harness {
            _temp: temp,
            state,
            runner,
            events,
            table,
        }
    }

    fn echo_completion() -> Arc<ScriptedCompletion> {
        ScriptedCompletion::new(|_, _| Ok(text_events("task finished")))
    }

    fn spawned_id(result: &str) -> String {
        result.rsplit("ID: ").next().unwrap().trim().to_string()
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in MasterOperation::ALL {
            assert_eq!(MasterOperation::from_name(op.name()), Some(op));
        }
        assert_eq!(MasterOperation::from_name("spawn"), None);
    }

    #[test]
    fn test_definitions_declare_required_fields() {
        let defs = MasterOperation::all_definitions();
        assert_eq!(defs.len(), 7);

        let delegate = defs.iter().find(|d| d.name == "delegate").unwrap();
        assert_eq!(
            delegate.input_schema["required"],
            json!(["worker_id", "task"])
        );
        let spawn = defs.iter().find(|d| d.name == "spawn_worker").unwrap();
        assert_eq!(spawn.input_schema["required"], json!(["worker_type"]));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_text_and_still_emits_events() {
        let h = harness(echo_completion());

        let result = h.table.dispatch("launch_missiles", &json!({}));

        assert!(result.starts_with("Unknown operation: launch_missiles."));
        assert!(result.contains("spawn_worker"));
        let kinds: Vec<EventKind> = h.events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::MasterToolCall, EventKind::MasterToolResult]
        );
    }

    #[tokio::test]
    async fn test_list_worker_types_names_every_template() {
        let h = harness(echo_completion());
        let result = h.table.dispatch("list_worker_types", &json!({}));

        assert!(result.starts_with("Available worker templates:"));
        assert!(result.contains("- coder: A coding specialist"));
        assert!(result.contains("  Tools: read_file, search_files"));
    }

    #[tokio::test]
    async fn test_spawn_worker_emits_event_and_reports_id() {
        let h = harness(echo_completion());
        let result = h
            .table
            .dispatch("spawn_worker", &json!({"worker_type": "general"}));

        assert!(result.starts_with("Spawned worker 'general' with ID: "));
        let id = spawned_id(&result);
        assert_eq!(h.state.worker(&id).unwrap().status, WorkerStatus::Idle);

        let events = h.events.lock();
        let spawned = events
            .iter()
            .find(|e| e.kind == EventKind::WorkerSpawned)
            .unwrap();
        assert_eq!(spawned.worker_id.as_deref(), Some(id.as_str()));
        assert_eq!(spawned.payload_str("agent_type"), Some("general"));
    }

    #[tokio::test]
    async fn test_spawn_unknown_type_reports_error_text() {
        let h = harness(echo_completion());
        let result = h
            .table
            .dispatch("spawn_worker", &json!({"worker_type": "wizard"}));

        assert!(result.starts_with("Error: Unknown worker type: wizard"));
        assert_eq!(h.state.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_is_reported() {
        let h = harness(echo_completion());
        let result = h.table.dispatch("spawn_worker", &json!({"type": "general"}));
        assert!(result.starts_with("Invalid input for spawn_worker:"), "{result}");
    }

    #[tokio::test]
    async fn test_delegate_then_get_completed_drains_once() {
        let h = harness(echo_completion());
        let id = spawned_id(
            &h.table
                .dispatch("spawn_worker", &json!({"worker_type": "general"})),
        );

        let ack = h.table.dispatch(
            "delegate",
            &json!({"worker_id": id, "task": "write a haiku to haiku.txt", "intention": "return_to_user"}),
        );
        assert!(ack.starts_with(&format!("Delegated task to worker {id}")));
        assert_eq!(h.state.worker(&id).unwrap().status, WorkerStatus::Working);

        h.runner.wait_idle().await;

        let completed = h.table.dispatch("get_completed", &json!({}));
        assert!(completed.contains(&format!("[Deliver to user] Worker {id} (general)")));
        assert!(completed.contains("Result:\ntask finished"));

        let worker = h.state.worker(&id).unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert!(worker.current_task.is_none());

        assert_eq!(
            h.table.dispatch("get_completed", &json!({})),
            "No completed tasks yet."
        );
    }

    #[tokio::test]
    async fn test_delegate_busy_worker_is_rejected() {
        let h = harness(echo_completion());
        let id = h.state.spawn("general").unwrap().id;
        h.state
            .assign(&id, "first", Intention::ReviewByMaster)
            .unwrap();

        let result = h
            .table
            .dispatch("delegate", &json!({"worker_id": id, "task": "second"}));

        assert_eq!(
            result,
            format!("Error: Worker {id} is already working on a task")
        );
        assert_eq!(
            h.state.worker(&id).unwrap().current_task.as_deref(),
            Some("first")
        );
        assert_eq!(h.runner.active_count(), 0);
    }

    #[tokio::test]
    async fn test_delegate_missing_worker_is_rejected() {
        let h = harness(echo_completion());
        let result = h
            .table
            .dispatch("delegate", &json!({"worker_id": "ghost", "task": "x"}));
        assert_eq!(result, "Error: Worker not found: ghost");
    }

    #[tokio::test]
    async fn test_delegate_rejects_bad_intentions() {
        let h = harness(echo_completion());
        let id = h.state.spawn("general").unwrap().id;

        let unknown = h.table.dispatch(
            "delegate",
            &json!({"worker_id": id, "task": "x", "intention": "shred"}),
        );
        assert!(unknown.starts_with("Invalid input for delegate: unknown intention 'shred'"));

        let no_target = h.table.dispatch(
            "delegate",
            &json!({"worker_id": id, "task": "x", "intention": "pass_to_agent"}),
        );
        assert_eq!(
            no_target,
            "Invalid input for delegate: pass_to_agent requires target_worker_id"
        );

        let self_target = h.table.dispatch(
            "delegate",
            &json!({"worker_id": id, "task": "x", "intention": "pass_to_agent", "target_worker_id": id}),
        );
        assert_eq!(self_target, format!("Error: Invalid forwarding target: {id}"));
        assert_eq!(h.state.worker(&id).unwrap().status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_get_completed_labels_by_intention() {
        let h = harness(echo_completion());
        let review = h.state.spawn("general").unwrap().id;
        let target = h.state.spawn("general").unwrap().id;
        let forward = h.state.spawn("researcher").unwrap().id;
        h.state
            .assign(&review, "check", Intention::ReviewByMaster)
            .unwrap();
        h.state.complete(&review, "looks fine").unwrap();
        h.state
            .assign(
                &forward,
                "find",
                Intention::PassToAgent {
                    target: target.clone(),
                    instructions: String::new(),
                },
            )
            .unwrap();
        h.state.complete(&forward, "found it").unwrap();

        let result = h.table.dispatch("get_completed", &Value::Null);

        assert!(result.starts_with("Completed tasks (2):"));
        assert!(result.contains(&format!("[Review before responding] Worker {review}")));
        assert!(result.contains(&format!("[Forwarded to {target}] Worker {forward}")));
    }

    #[tokio::test]
    async fn test_terminate_worker_removes_record() {
        let h = harness(echo_completion());
        let id = h.state.spawn("coder").unwrap().id;

        let result = h.table.dispatch("terminate_worker", &json!({"worker_id": id}));

        assert_eq!(result, format!("Terminated worker {id} (coder)"));
        assert!(h.state.worker(&id).is_none());
        assert!(
            h.events
                .lock()
                .iter()
                .any(|e| e.kind == EventKind::WorkerTerminated)
        );
    }

    #[tokio::test]
    async fn test_terminate_unknown_worker_leaves_state() {
        let h = harness(echo_completion());
        h.state.spawn("coder").unwrap();

        let result = h
            .table
            .dispatch("terminate_worker", &json!({"worker_id": "never"}));

        assert_eq!(result, "Error: Worker not found: never");
        assert_eq!(h.state.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_list_workers_and_detail() {
        let h = harness(echo_completion());
        assert_eq!(h.table.dispatch("list_workers", &json!({})), "No workers running.");

        let id = h.state.spawn("researcher").unwrap().id;
        h.state
            .assign(&id, "survey the docs", Intention::ReviewByMaster)
            .unwrap();

        let list = h.table.dispatch("list_workers", &json!({}));
        assert!(list.contains(&format!("- {id} (researcher) Status: working")));
        assert!(list.contains("  Task: survey the docs"));

        let detail = h
            .table
            .dispatch("get_worker_detail", &json!({"worker_id": id}));
        assert!(detail.contains("Type: researcher"));
        assert!(detail.contains("Tools: read_file, search_files"));
        assert!(detail.contains("Intention: review_by_master"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }
}
