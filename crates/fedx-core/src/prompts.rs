//! System prompt templates.

use chrono::Utc;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::warn;

use crate::core::state::WorkerTemplate;

/// Default master system prompt template (`MiniJinja`).
pub const MASTER_SYSTEM_PROMPT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/master_system_prompt.md"
));

#[derive(Debug, Serialize)]
struct MasterPromptVars<'a> {
    templates: &'a [WorkerTemplate],
    workspace: String,
    date: String,
}

/// Renders the master system prompt.
///
/// `override_template` replaces the built-in template; if it fails to render
/// the built-in one is used instead.
pub fn render_master_prompt(
    override_template: Option<&str>,
    templates: &[WorkerTemplate],
    workspace: &std::path::Path,
) -> String {
    let vars = MasterPromptVars {
        templates,
        workspace: workspace.display().to_string(),
        date: Utc::now().format("%Y-%m-%d").to_string(),
    };

    if let Some(source) = override_template.filter(|s| !s.trim().is_empty()) {
        match render_prompt_template(source, &vars) {
            Ok(rendered) => return rendered,
            Err(error) => {
                warn!(%error, "Failed to render master prompt override; using built-in template");
            }
        }
    }

    render_prompt_template(MASTER_SYSTEM_PROMPT_TEMPLATE, &vars)
        .unwrap_or_else(|_| MASTER_SYSTEM_PROMPT_TEMPLATE.trim().to_string())
}

fn render_prompt_template(
    template: &str,
    vars: &MasterPromptVars<'_>,
) -> std::result::Result<String, String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("master", template)
        .map_err(|error| error.to_string())?;

    let output = env
        .get_template("master")
        .map_err(|error| error.to_string())?
        .render(vars)
        .map_err(|error| error.to_string())?;

    Ok(output.replace("\r\n", "\n").trim().to_string())
}
