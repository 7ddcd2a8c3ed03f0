//! Line-oriented interactive session.
//!
//! Each stdin line is one master request. The federation (and therefore the
//! master transcript and the worker pool) lives for the whole session.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use fedx_core::config::Config;
use fedx_core::core::federation::Federation;
use tracing::warn;

use super::render::{RenderOptions, spawn_renderer_task, subscribe_renderer};
use crate::interrupt::{self, InterruptedError};

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub workspace: Option<PathBuf>,
    pub render: RenderOptions,
}

const PROMPT: &str = "fedx> ";

/// Runs the interactive loop until EOF, `quit`/`exit`, or Ctrl-C.
pub async fn run_chat(config: &Config, options: &ChatOptions) -> Result<()> {
    let mut federation = Federation::from_config(config, options.workspace.as_deref())?;
    let (subscription, rx) = subscribe_renderer(federation.bus(), options.render);
    let renderer = spawn_renderer_task(rx, options.render);

    eprintln!(
        "fedx chat (workspace: {}). Type 'quit' to exit.",
        federation.workspace().display()
    );

    let outcome = chat_loop(&mut federation).await;

    federation.shutdown().await;
    federation.bus().unsubscribe(subscription);
    let _ = renderer.await;
    outcome
}

async fn chat_loop(federation: &mut Federation) -> Result<()> {
    loop {
        eprint!("{PROMPT}");
        let _ = std::io::stderr().flush();

        let line = tokio::select! {
            line = read_line() => line?,
            () = interrupt::wait_for_interrupt() => return Err(InterruptedError.into()),
        };
        let Some(line) = line else {
            eprintln!();
            return Ok(());
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit") {
            return Ok(());
        }

        tokio::select! {
            result = federation.run(input) => {
                if let Err(e) = result {
                    warn!(error = %e, "Master request failed");
                    eprintln!("Error: {e:#}");
                }
            }
            () = interrupt::wait_for_interrupt() => return Err(InterruptedError.into()),
        }
    }
}

/// Reads one line from stdin off the async runtime. `None` on EOF.
async fn read_line() -> Result<Option<String>> {
    tokio::task::spawn_blocking(|| -> Result<Option<String>> {
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read stdin")?;
        Ok(if read == 0 { None } else { Some(line) })
    })
    .await
    .context("Stdin reader task failed")?
}
