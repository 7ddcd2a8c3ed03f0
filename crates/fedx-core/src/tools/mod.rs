//! Worker-side tools.
//!
//! A small fixed toolset rooted at the shared workspace directory. Every
//! path a tool touches is resolved against the workspace root and rejected
//! if it would escape it. Tools take JSON input and return text.

pub mod read_file;
pub mod search_files;
pub mod write_file;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const SEARCH_FILES: &str = "search_files";

/// Tool schema catalog entry, as advertised to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Success { content: String },
    Failure { code: String, message: String },
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        ToolOutput::Success {
            content: content.into(),
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        ToolOutput::Failure {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Failure for a path that would leave the workspace root.
    pub fn path_rejected(path: &str) -> Self {
        Self::failure(
            "path_rejected",
            format!("Path escapes workspace root: {path}"),
        )
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutput::Success { .. })
    }

    /// Returns the failure code, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ToolOutput::Success { .. } => None,
            ToolOutput::Failure { code, .. } => Some(code),
        }
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Success { content } => f.write_str(content),
            ToolOutput::Failure { code, message } => write!(f, "Error [{code}]: {message}"),
        }
    }
}

/// Result of one tool invocation, sent back in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn from_output(tool_use_id: impl Into<String>, output: &ToolOutput) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: output.to_string(),
            is_error: !output.is_ok(),
        }
    }
}

/// Context for tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Workspace root; every tool path is confined to it.
    pub root: PathBuf,

    /// Optional timeout for a single tool execution.
    pub timeout: Option<Duration>,
}

impl ToolContext {
    pub fn new(root: PathBuf, timeout: Option<Duration>) -> Self {
        Self { root, timeout }
    }
}

/// Resolves `path` inside the workspace root.
///
/// `..` and `.` are normalised lexically, then the deepest existing ancestor
/// is canonicalised so symlinks cannot point outside the root. Absolute
/// paths are allowed only when they land inside the root.
///
/// # Errors
/// Returns a `path_rejected` failure if the path escapes the root, or an
/// `io_error` failure if the root itself cannot be resolved.
pub fn resolve_in_root(path: &str, root: &Path) -> Result<PathBuf, ToolOutput> {
    let root = root.canonicalize().map_err(|e| {
        ToolOutput::failure(
            "io_error",
            format!("Workspace root is not accessible '{}': {e}", root.display()),
        )
    })?;

    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let normalized = normalize_lexically(&joined);
    if !normalized.starts_with(&root) {
        return Err(ToolOutput::path_rejected(path));
    }

    let mut probe = Some(normalized.as_path());
    while let Some(candidate) = probe {
        if std::fs::symlink_metadata(candidate).is_ok() {
            match candidate.canonicalize() {
                Ok(real) if real.starts_with(&root) => break,
                _ => return Err(ToolOutput::path_rejected(path)),
            }
        }
        probe = candidate.parent();
    }

    Ok(normalized)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Async tool handler function.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolOutput> + Send>>;
pub type ToolHandler = Arc<dyn Fn(&Value, &ToolContext) -> ToolFuture + Send + Sync>;

/// Tool registry (definitions + executors), built once at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("definitions", &self.definitions)
            .field("handlers_len", &self.handlers.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `read_file`, `write_file` and `search_files`.
    pub fn builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_tools();
        registry
    }

    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        let name_lower = definition.name.to_ascii_lowercase();
        self.definitions
            .retain(|t| !t.name.eq_ignore_ascii_case(&definition.name));
        self.definitions.push(definition);
        self.handlers.insert(name_lower, handler);
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns the definitions named in `names`, in registry order.
    pub fn tools_from_names<'a, I>(&self, names: I) -> Vec<ToolDefinition>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let include: std::collections::HashSet<String> = names
            .into_iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        self.definitions
            .iter()
            .filter(|t| include.contains(&t.name.to_ascii_lowercase()))
            .cloned()
            .collect()
    }

    /// Executes `name` if it is in `enabled`; otherwise returns an
    /// `unknown_tool` failure listing what is available.
    pub async fn execute_tool(
        &self,
        name: &str,
        input: &Value,
        ctx: &ToolContext,
        enabled: &[String],
    ) -> ToolOutput {
        let name_lower = name.to_ascii_lowercase();
        let is_enabled = enabled.iter().any(|t| t.eq_ignore_ascii_case(&name_lower));

        match self.handlers.get(&name_lower) {
            Some(handler) if is_enabled => handler(input, ctx).await,
            _ => unknown_tool_output(name, enabled),
        }
    }

    fn register_builtin_tools(&mut self) {
        self.register(
            read_file::definition(),
            Arc::new(|input, ctx| {
                let input = input.clone();
                let ctx = ctx.clone();
                Box::pin(async move {
                    execute_blocking(ctx.timeout, move || read_file::execute(&input, &ctx)).await
                })
            }),
        );

        self.register(
            write_file::definition(),
            Arc::new(|input, ctx| {
                let input = input.clone();
                let ctx = ctx.clone();
                Box::pin(async move {
                    execute_blocking(ctx.timeout, move || write_file::execute(&input, &ctx)).await
                })
            }),
        );

        self.register(
            search_files::definition(),
            Arc::new(|input, ctx| {
                let input = input.clone();
                let ctx = ctx.clone();
                Box::pin(async move {
                    execute_blocking(ctx.timeout, move || search_files::execute(&input, &ctx))
                        .await
                })
            }),
        );
    }
}

fn unknown_tool_output(name: &str, enabled: &[String]) -> ToolOutput {
    let mut available: Vec<&str> = enabled.iter().map(String::as_str).collect();
    available.sort_unstable();
    let available = if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    };
    ToolOutput::failure(
        "unknown_tool",
        format!("Unknown tool: {name}. Available tools: {available}"),
    )
}

/// Runs a blocking tool function on the blocking pool with optional timeout.
async fn execute_blocking<F>(timeout: Option<Duration>, f: F) -> ToolOutput
where
    F: FnOnce() -> ToolOutput + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(f);

    match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(output)) => output,
            Ok(Err(_)) => ToolOutput::failure("panic", "Tool execution panicked"),
            Err(_) => {
                handle.abort();
                ToolOutput::failure(
                    "timeout",
                    format!(
                        "Tool execution timed out after {} seconds",
                        timeout.as_secs()
                    ),
                )
            }
        },
        None => match handle.await {
            Ok(output) => output,
            Err(_) => ToolOutput::failure("panic", "Tool execution panicked or was cancelled"),
        },
    }
}
