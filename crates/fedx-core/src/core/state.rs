//! Federation state: worker records, templates and the completion queue.
//!
//! This is the single source of truth shared by the master loop, the
//! dispatch table and every worker execution. All mutations happen under one
//! mutex, so check-then-set sequences (e.g. rejecting a delegation to a busy
//! worker) are atomic with respect to each other.
//!
//! Worker lifecycle:
//!
//! ```text
//! spawn ──> IDLE ──assign──> WORKING ──complete──> DONE ──drain_completed──> IDLE
//!                                                          terminate removes the record
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tools::{READ_FILE, SEARCH_FILES, WRITE_FILE};

/// Worker lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    Done,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Working => write!(f, "working"),
            WorkerStatus::Done => write!(f, "done"),
        }
    }
}

/// What should happen to a worker's result once its task completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intention {
    /// Hand the result back to the user verbatim.
    ReturnToUser,
    /// Let the master review the result before answering.
    ReviewByMaster,
    /// Forward the result to another worker as a new task.
    PassToAgent {
        /// Worker that receives the forwarded task.
        target: String,
        /// Instructions prepended to the forwarded result.
        instructions: String,
    },
}

impl Intention {
    /// Wire name used in tool schemas and event payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Intention::ReturnToUser => "return_to_user",
            Intention::ReviewByMaster => "review_by_master",
            Intention::PassToAgent { .. } => "pass_to_agent",
        }
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intention::PassToAgent { target, .. } => write!(f, "pass_to_agent({target})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Immutable definition of a worker type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTemplate {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Tool names this worker type may invoke, in advertised order.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl WorkerTemplate {
    /// Built-in worker types available without configuration.
    pub fn defaults() -> Vec<WorkerTemplate> {
        let rw = vec![
            READ_FILE.to_string(),
            WRITE_FILE.to_string(),
            SEARCH_FILES.to_string(),
        ];
        vec![
            WorkerTemplate {
                name: "general".to_string(),
                description: "A general-purpose worker that can handle various tasks.".to_string(),
                system_prompt:
                    "You are a helpful worker agent. Complete tasks thoroughly and clearly."
                        .to_string(),
                allowed_tools: rw.clone(),
            },
            WorkerTemplate {
                name: "coder".to_string(),
                description: "A coding specialist for writing and modifying code.".to_string(),
                system_prompt: "You are a coding agent. Write clean, well-structured code with good error handling.".to_string(),
                allowed_tools: rw,
            },
            WorkerTemplate {
                name: "researcher".to_string(),
                description: "A research agent for gathering and analyzing information."
                    .to_string(),
                system_prompt: "You are a research agent. Gather information thoroughly and provide clear summaries.".to_string(),
                allowed_tools: vec![READ_FILE.to_string(), SEARCH_FILES.to_string()],
            },
        ]
    }
}

/// A live worker record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worker {
    pub id: String,
    /// Template name this worker was spawned from.
    pub worker_type: String,
    pub status: WorkerStatus,
    pub current_task: Option<String>,
    pub intention: Option<Intention>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    fn reset(&mut self) {
        self.status = WorkerStatus::Idle;
        self.current_task = None;
        self.intention = None;
        self.result = None;
    }
}

/// Failures of state operations. Callers render these as text for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    UnknownTemplate(String),
    WorkerNotFound(String),
    /// The worker already has an active task.
    WorkerBusy(String),
    /// The worker holds a result that has not been drained yet.
    ResultPending(String),
    /// `complete` was called for a worker with no task.
    NotWorking(String),
    /// A `pass_to_agent` target is missing or equal to the source worker.
    InvalidTarget(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::UnknownTemplate(name) => write!(f, "Unknown worker type: {name}"),
            StateError::WorkerNotFound(id) => write!(f, "Worker not found: {id}"),
            StateError::WorkerBusy(id) => {
                write!(f, "Worker {id} is already working on a task")
            }
            StateError::ResultPending(id) => write!(
                f,
                "Worker {id} has a completed result that has not been collected; call get_completed first"
            ),
            StateError::NotWorking(id) => write!(f, "Worker {id} has no task in progress"),
            StateError::InvalidTarget(id) => write!(f, "Invalid forwarding target: {id}"),
        }
    }
}

impl std::error::Error for StateError {}

#[derive(Debug, Default)]
struct StateInner {
    workers: HashMap<String, Worker>,
    templates: BTreeMap<String, WorkerTemplate>,
    completed_queue: VecDeque<String>,
}

/// Thread-safe coordinator over the federation aggregate.
#[derive(Debug, Default)]
pub struct FederationState {
    inner: Mutex<StateInner>,
}

impl FederationState {
    /// Creates state with the given templates (later duplicates win).
    pub fn new(templates: impl IntoIterator<Item = WorkerTemplate>) -> Self {
        let state = Self::default();
        for template in templates {
            state.register_template(template);
        }
        state
    }

    /// Creates state seeded with the built-in templates.
    pub fn with_default_templates() -> Self {
        Self::new(WorkerTemplate::defaults())
    }

    /// Adds or replaces a template.
    pub fn register_template(&self, template: WorkerTemplate) {
        self.inner
            .lock()
            .templates
            .insert(template.name.clone(), template);
    }

    pub fn templates(&self) -> Vec<WorkerTemplate> {
        self.inner.lock().templates.values().cloned().collect()
    }

    pub fn template(&self, name: &str) -> Option<WorkerTemplate> {
        self.inner.lock().templates.get(name).cloned()
    }

    pub fn worker(&self, id: &str) -> Option<Worker> {
        self.inner.lock().workers.get(id).cloned()
    }

    /// Snapshot of all live workers, oldest first.
    pub fn workers(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self.inner.lock().workers.values().cloned().collect();
        workers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        workers
    }

    pub fn worker_count(&self) -> usize {
        self.inner.lock().workers.len()
    }

    pub fn completed_len(&self) -> usize {
        self.inner.lock().completed_queue.len()
    }

    /// Ids currently waiting in the completion queue, in completion order.
    pub fn completed_ids(&self) -> Vec<String> {
        self.inner.lock().completed_queue.iter().cloned().collect()
    }

    /// Creates an IDLE worker from a template.
    ///
    /// # Errors
    /// Returns `UnknownTemplate` if no template has that name.
    pub fn spawn(&self, template_name: &str) -> Result<Worker, StateError> {
        let mut inner = self.inner.lock();
        if !inner.templates.contains_key(template_name) {
            return Err(StateError::UnknownTemplate(template_name.to_string()));
        }

        let id = loop {
            let candidate: String = uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(8)
                .collect();
            if !inner.workers.contains_key(&candidate) {
                break candidate;
            }
        };

        let worker = Worker {
            id: id.clone(),
            worker_type: template_name.to_string(),
            status: WorkerStatus::Idle,
            current_task: None,
            intention: None,
            result: None,
            created_at: Utc::now(),
        };
        inner.workers.insert(id.clone(), worker.clone());
        info!(worker_id = %id, worker_type = template_name, "Spawned worker");
        Ok(worker)
    }

    /// Moves an IDLE worker to WORKING with the given task.
    ///
    /// State is left untouched on every failure.
    ///
    /// # Errors
    /// `WorkerNotFound`, `WorkerBusy` (already WORKING), `ResultPending`
    /// (DONE but not drained) or `InvalidTarget` for a bad forwarding target.
    pub fn assign(
        &self,
        worker_id: &str,
        task: &str,
        intention: Intention,
    ) -> Result<Worker, StateError> {
        let mut inner = self.inner.lock();

        if let Intention::PassToAgent { target, .. } = &intention
            && (target == worker_id || !inner.workers.contains_key(target))
        {
            return Err(StateError::InvalidTarget(target.clone()));
        }

        let worker = inner
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StateError::WorkerNotFound(worker_id.to_string()))?;

        match worker.status {
            WorkerStatus::Working => return Err(StateError::WorkerBusy(worker_id.to_string())),
            WorkerStatus::Done => return Err(StateError::ResultPending(worker_id.to_string())),
            WorkerStatus::Idle => {}
        }

        worker.status = WorkerStatus::Working;
        worker.current_task = Some(task.to_string());
        worker.intention = Some(intention);
        worker.result = None;
        info!(worker_id, "Assigned task");
        Ok(worker.clone())
    }

    /// Marks a worker DONE with `result` and enqueues it once.
    ///
    /// Completing an already-DONE worker overwrites the result without
    /// enqueueing it a second time.
    ///
    /// # Errors
    /// `WorkerNotFound`, or `NotWorking` for an IDLE worker.
    pub fn complete(&self, worker_id: &str, result: &str) -> Result<Worker, StateError> {
        let mut inner = self.inner.lock();
        let worker = inner
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StateError::WorkerNotFound(worker_id.to_string()))?;

        let enqueue = match worker.status {
            WorkerStatus::Idle => return Err(StateError::NotWorking(worker_id.to_string())),
            WorkerStatus::Working => true,
            WorkerStatus::Done => false,
        };

        worker.status = WorkerStatus::Done;
        worker.result = Some(result.to_string());
        let snapshot = worker.clone();

        if enqueue && !inner.completed_queue.iter().any(|id| id == worker_id) {
            inner.completed_queue.push_back(worker_id.to_string());
        }
        info!(worker_id, "Completed task");
        Ok(snapshot)
    }

    /// Drains the completion queue.
    ///
    /// This is a consuming read: each returned record is a snapshot taken
    /// while DONE (task, intention and result intact), and the live worker is
    /// reset to IDLE and removed from the queue.
    pub fn drain_completed(&self) -> Vec<Worker> {
        let mut inner = self.inner.lock();
        let queued: Vec<String> = inner.completed_queue.drain(..).collect();

        let drained: Vec<Worker> = queued
            .into_iter()
            .filter_map(|id| {
                let worker = inner.workers.get_mut(&id)?;
                if worker.status != WorkerStatus::Done {
                    return None;
                }
                let snapshot = worker.clone();
                worker.reset();
                Some(snapshot)
            })
            .collect();
        debug!(count = drained.len(), "Drained completed workers");
        drained
    }

    /// Removes a worker record and any queue entry.
    ///
    /// # Errors
    /// Returns `WorkerNotFound` if the id is unknown.
    pub fn terminate(&self, worker_id: &str) -> Result<Worker, StateError> {
        let mut inner = self.inner.lock();
        let worker = inner
            .workers
            .remove(worker_id)
            .ok_or_else(|| StateError::WorkerNotFound(worker_id.to_string()))?;
        inner.completed_queue.retain(|id| id != worker_id);
        info!(worker_id, "Terminated worker");
        Ok(worker)
    }
}

#[cfg(test)]
impl FederationState {
    /// Asserts the per-status field invariants for every record.
    pub(crate) fn assert_invariants(&self) {
        let inner = self.inner.lock();
        for (id, worker) in &inner.workers {
            let queued = inner.completed_queue.iter().filter(|q| *q == id).count();
            match worker.status {
                WorkerStatus::Idle => {
                    assert!(worker.current_task.is_none(), "{id}: idle with task");
                    assert!(worker.intention.is_none(), "{id}: idle with intention");
                    assert!(worker.result.is_none(), "{id}: idle with result");
                    assert_eq!(queued, 0, "{id}: idle but queued");
                }
                WorkerStatus::Working => {
                    assert!(worker.current_task.is_some(), "{id}: working without task");
                    assert!(worker.intention.is_some(), "{id}: working without intention");
                    assert!(worker.result.is_none(), "{id}: working with result");
                    assert_eq!(queued, 0, "{id}: working but queued");
                }
                WorkerStatus::Done => {
                    assert!(worker.result.is_some(), "{id}: done without result");
                    assert_eq!(queued, 1, "{id}: done but queued {queued} times");
                }
            }
        }
    }
}
