//! Explicit wiring of the federation components.
//!
//! Everything is built once, up front: state, bus, worker runner, dispatch
//! table and master loop share their collaborators through `Arc`s handed in
//! here. There is no lazily created global.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::Config;
use crate::core::bus::EventBus;
use crate::core::dispatch::DispatchTable;
use crate::core::master::MasterLoop;
use crate::core::state::{FederationState, WorkerTemplate};
use crate::core::worker::{DEFAULT_MAX_WORKER_TURNS, WorkerRunner, WorkerRunnerConfig};
use crate::prompts::render_master_prompt;
use crate::providers::CompletionService;
use crate::providers::anthropic::{AnthropicClient, AnthropicConfig};
use crate::tools::{ToolContext, ToolRegistry};

/// Settings needed to assemble a [`Federation`].
#[derive(Debug, Clone)]
pub struct FederationOptions {
    pub workspace: PathBuf,
    /// Templates registered on top of the built-in ones.
    pub templates: Vec<WorkerTemplate>,
    pub master_prompt_override: Option<String>,
    pub delegation_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    pub max_worker_turns: usize,
}

impl FederationOptions {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            templates: Vec::new(),
            master_prompt_override: None,
            delegation_timeout: None,
            tool_timeout: None,
            max_worker_turns: DEFAULT_MAX_WORKER_TURNS,
        }
    }

    /// Builds options from configuration. `workspace` overrides the
    /// configured directory.
    ///
    /// # Errors
    /// Returns an error if the master prompt file cannot be read.
    pub fn from_config(config: &Config, workspace: Option<&Path>) -> Result<Self> {
        Ok(Self {
            workspace: workspace.map_or_else(|| config.workspace.clone(), Path::to_path_buf),
            templates: config.templates.clone(),
            master_prompt_override: config.effective_master_prompt()?,
            delegation_timeout: config.delegation_timeout(),
            tool_timeout: config.tool_timeout(),
            max_worker_turns: config.max_worker_turns.max(1),
        })
    }
}

/// A fully wired federation: one master conversation plus its workers.
#[derive(Debug)]
pub struct Federation {
    workspace: PathBuf,
    state: Arc<FederationState>,
    bus: Arc<EventBus>,
    runner: WorkerRunner,
    master: MasterLoop,
}

impl Federation {
    /// Assembles the federation around `completion`.
    ///
    /// Creates the workspace directory if needed.
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be created or resolved.
    pub fn new(options: FederationOptions, completion: Arc<dyn CompletionService>) -> Result<Self> {
        fs::create_dir_all(&options.workspace).with_context(|| {
            format!(
                "Failed to create workspace {}",
                options.workspace.display()
            )
        })?;
        let workspace = options.workspace.canonicalize().with_context(|| {
            format!(
                "Failed to resolve workspace {}",
                options.workspace.display()
            )
        })?;

        let state = Arc::new(FederationState::with_default_templates());
        for template in options.templates {
            debug!(template = %template.name, "Registering configured template");
            state.register_template(template);
        }

        let bus = Arc::new(EventBus::new());
        let runner = WorkerRunner::new(
            Arc::clone(&state),
            Arc::clone(&bus),
            Arc::clone(&completion),
            ToolRegistry::builtins(),
            ToolContext::new(workspace.clone(), options.tool_timeout),
            WorkerRunnerConfig {
                max_turns: options.max_worker_turns,
                delegation_timeout: options.delegation_timeout,
            },
        );
        let dispatch = DispatchTable::new(Arc::clone(&state), Arc::clone(&bus), runner.clone());
        let system_prompt = render_master_prompt(
            options.master_prompt_override.as_deref(),
            &state.templates(),
            &workspace,
        );
        let master = MasterLoop::new(completion, dispatch, Arc::clone(&bus), system_prompt);

        info!(workspace = %workspace.display(), "Federation ready");
        Ok(Self {
            workspace,
            state,
            bus,
            runner,
            master,
        })
    }

    /// Assembles a federation backed by the Anthropic client.
    ///
    /// # Errors
    /// Returns an error if no API key is available, the base URL is invalid
    /// or the workspace cannot be created.
    pub fn from_config(config: &Config, workspace: Option<&Path>) -> Result<Self> {
        let anthropic = &config.providers.anthropic;
        let client_config = AnthropicConfig::from_env(
            config.model.clone(),
            config.max_tokens,
            anthropic.effective_base_url(),
            anthropic.effective_api_key(),
        )?;
        let completion: Arc<dyn CompletionService> =
            Arc::new(AnthropicClient::new(client_config));
        Self::new(FederationOptions::from_config(config, workspace)?, completion)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn state(&self) -> &Arc<FederationState> {
        &self.state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn runner(&self) -> &WorkerRunner {
        &self.runner
    }

    pub fn master(&self) -> &MasterLoop {
        &self.master
    }

    /// Runs one user request through the master loop.
    ///
    /// # Errors
    /// See [`MasterLoop::run`].
    pub async fn run(&mut self, user_message: &str) -> Result<String> {
        self.master.run(user_message).await
    }

    /// Waits for every worker execution, including chained ones.
    pub async fn wait_idle(&self) {
        self.runner.wait_idle().await;
    }

    /// Cancels and joins every worker execution.
    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
    }
}
