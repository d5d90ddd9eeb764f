//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bubble_core::{config, logging};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "bubble")]
#[command(version = "0.1")]
#[command(about = "Terminal host for the bubble chat widget")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Widget api key (overrides config)
    #[arg(long, global = true, env = "BUBBLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Backend base URL (overrides config)
    #[arg(long, global = true, env = "BUBBLE_API_BASE")]
    api_base: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Chat with a deployed bot
    Chat {
        /// Show replies as plain text, skipping Markdown rendering
        #[arg(long, conflicts_with = "html")]
        plain: bool,

        /// Print the sanitized HTML of each finished reply
        #[arg(long)]
        html: bool,
    },
    /// Replay a captured reply stream through the renderer
    Replay {
        /// File with `data: ` lines; blank lines separate chunks
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the rendered HTML instead of the text
        #[arg(long)]
        html: bool,
    },
    /// Rate a conversation
    Rate {
        /// Stars from 1 to 5
        #[arg(value_name = "RATING", value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,

        /// Session to rate (default: the stored session)
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Create a config file with defaults
    Init,
    /// Store the widget api key in the config file
    SetKey {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()
        .context("load config")?
        .with_overrides(cli.api_key.clone(), cli.api_base.clone());
    let _log_guard = logging::init(&config.log).context("init logging")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli.command, config).await })
}

async fn dispatch(command: Commands, mut config: config::Config) -> Result<()> {
    match command {
        Commands::Chat { plain, html } => {
            if plain {
                config.render = config::RenderMode::Plain;
            }
            commands::chat::run(&config, commands::chat::ChatOptions { show_html: html }).await
        }
        Commands::Replay { file, html } => commands::replay::run(&file, html),
        Commands::Rate { rating, session } => commands::rate::run(&config, rating, session).await,
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetKey { key } => commands::config::set_key(&key),
        },
    }
}
