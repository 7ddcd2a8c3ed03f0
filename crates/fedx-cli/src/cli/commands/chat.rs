//! Chat command handler.

use std::path::PathBuf;

use anyhow::Result;
use fedx_core::config::Config;

use crate::cli::RenderArgs;
use crate::modes;

pub async fn run(workspace: Option<PathBuf>, render: RenderArgs, config: &Config) -> Result<()> {
    let chat_opts = modes::chat::ChatOptions {
        workspace,
        render: render.into(),
    };
    modes::chat::run_chat(config, &chat_opts).await
}
