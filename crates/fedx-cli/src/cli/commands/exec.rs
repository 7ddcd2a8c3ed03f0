//! Exec command handler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use fedx_core::config::Config;

use crate::cli::RenderArgs;
use crate::interrupt::InterruptedError;
use crate::modes;

pub async fn run(
    workspace: Option<PathBuf>,
    prompt: &str,
    wait: bool,
    render: RenderArgs,
    config: &Config,
) -> Result<()> {
    let exec_opts = modes::exec::ExecOptions {
        workspace,
        wait,
        render: render.into(),
    };

    // Master text is streamed by the renderer; the returned answer is not reprinted.
    match modes::exec::run_exec(prompt, config, &exec_opts).await {
        Ok(_) => Ok(()),
        Err(e) if e.is::<InterruptedError>() => Err(e),
        Err(e) => Err(e.context("execute prompt")),
    }
}
