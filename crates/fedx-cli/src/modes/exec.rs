//! Single-shot exec mode.

use std::path::PathBuf;

use anyhow::Result;
use fedx_core::config::Config;
use fedx_core::core::federation::Federation;
use tracing::info;

use super::render::{RenderOptions, spawn_renderer_task, subscribe_renderer};
use crate::interrupt::{self, InterruptedError};

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Workspace override; falls back to the configured directory.
    pub workspace: Option<PathBuf>,
    /// Wait for outstanding worker executions before returning.
    pub wait: bool,
    pub render: RenderOptions,
}

/// Runs `prompt` through the master loop, streaming events to the console.
///
/// Returns the master's final answer. Uncollected worker results are printed
/// after the wait.
pub async fn run_exec(prompt: &str, config: &Config, options: &ExecOptions) -> Result<String> {
    let mut federation = Federation::from_config(config, options.workspace.as_deref())?;
    let (subscription, rx) = subscribe_renderer(federation.bus(), options.render);
    let renderer = spawn_renderer_task(rx, options.render);

    let mut interrupted = false;
    let result = tokio::select! {
        result = federation.run(prompt) => result,
        () = interrupt::wait_for_interrupt() => {
            interrupted = true;
            Err(InterruptedError.into())
        }
    };

    if result.is_ok() && options.wait {
        let active = federation.runner().active_count();
        if active > 0 {
            info!(active, "Waiting for worker executions");
            eprintln!("Waiting for {active} worker(s)...");
            tokio::select! {
                () = federation.wait_idle() => {}
                () = interrupt::wait_for_interrupt() => interrupted = true,
            }
        }
    }

    if interrupted {
        eprintln!("\n^C Interrupted. Cancelling workers...");
    }
    federation.shutdown().await;
    federation.bus().unsubscribe(subscription);
    let _ = renderer.await;

    if interrupted {
        return Err(InterruptedError.into());
    }
    let answer = result?;
    if options.wait {
        super::print_uncollected_results(&federation);
    }
    Ok(answer)
}
