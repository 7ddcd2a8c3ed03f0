//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fedx_core::config;

use crate::{interrupt, logging};

mod commands;

#[derive(Parser)]
#[command(name = "fedx")]
#[command(version = "0.1")]
#[command(about = "Master agent delegating to concurrent worker agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Shared workspace for worker file tools (default: from config)
    #[arg(long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Override the model from config
    #[arg(long, global = true)]
    model: Option<String>,
}

/// Flags shared by the modes that render federation events.
#[derive(clap::Args, Debug, Clone, Copy, Default)]
struct RenderArgs {
    /// Write raw events to stderr as JSON lines
    #[arg(long = "events-json")]
    events_json: bool,

    /// Stream worker text to stderr
    #[arg(long = "show-worker-text")]
    show_worker_text: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sends one prompt to the master agent
    Exec {
        /// The prompt to send to the master agent
        #[arg(short, long)]
        prompt: String,

        /// Return as soon as the master answers, cancelling running workers
        #[arg(long = "no-wait")]
        no_wait: bool,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Starts an interactive session (default)
    Chat {
        #[command(flatten)]
        render: RenderArgs,
    },

    /// Lists the worker templates
    Templates,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::load().context("load config")?;
    if let Some(model) = cli.model.as_deref() {
        config.model = model.to_string();
    }

    let _log_guard = logging::init(&config.logging)?;
    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(dispatch(cli, &config))
}

async fn dispatch(cli: Cli, config: &config::Config) -> Result<()> {
    let workspace = cli.workspace;

    // default to chat mode
    let Some(command) = cli.command else {
        return commands::chat::run(workspace, RenderArgs::default(), config).await;
    };

    match command {
        Commands::Exec {
            prompt,
            no_wait,
            render,
        } => commands::exec::run(workspace, &prompt, !no_wait, render, config).await,

        Commands::Chat { render } => commands::chat::run(workspace, render, config).await,

        Commands::Templates => {
            commands::templates::list(config);
            Ok(())
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}

impl From<RenderArgs> for crate::modes::render::RenderOptions {
    fn from(args: RenderArgs) -> Self {
        Self {
            json_events: args.events_json,
            show_worker_text: args.show_worker_text,
        }
    }
}
