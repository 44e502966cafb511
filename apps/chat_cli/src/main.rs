mod commands;
mod config;
mod repl;
mod view;

use std::{
    io::{self, IsTerminal, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{HttpResearchClient, SubmitOutcome, ThemeController, DEFAULT_HISTORY_LIMIT};
use shared::domain::DetailLevel;
use storage::{MemoryPreferenceStore, PreferenceStore, Storage};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{load_config, ChatConfig},
    repl::ChatSession,
    view::{render_health, render_history},
};

#[derive(Parser, Debug)]
#[command(name = "research-chat", version, about = "Chat with a research assistant service")]
struct Cli {
    /// Config file; defaults to ./research-chat.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Number of sources requested per question.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    sources: Option<u32>,
    #[arg(long, global = true)]
    detail: Option<DetailLevel>,
    #[arg(long, global = true)]
    min_chars: Option<usize>,
    /// Request timeout in seconds.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (the default).
    Chat,
    /// Ask a single question and print the answer.
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    Health,
    History {
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
    Analytics,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ChatConfig) {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(count) = self.sources {
            config.num_sources = count;
        }
        if let Some(level) = self.detail {
            config.detail_level = level;
        }
        if let Some(min_chars) = self.min_chars {
            config.min_question_chars = min_chars;
        }
        if let Some(secs) = self.timeout {
            config.request_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let client = Arc::new(
        HttpResearchClient::new(&config.api_url, config.request_timeout())
            .context("invalid research service url")?,
    );
    info!(api_url = %client.base_url(), timeout_secs = config.request_timeout_secs, "research client ready");

    let mut stdout = io::stdout();
    match cli.command.unwrap_or(Command::Chat) {
        Command::Health => {
            let report = client.health().await?;
            writeln!(stdout, "{}", render_health(&report))?;
            if !report.is_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::History { limit } => {
            let page = client.history(limit).await?;
            writeln!(stdout, "{}", render_history(&page))?;
        }
        Command::Analytics => {
            let analytics = client.analytics().await?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&analytics)?)?;
        }
        Command::Ask { question } => {
            let session = open_session(client, &config, cli.no_color).await;
            let question = question.join(" ");
            match session.ask(question.trim(), &mut stdout).await? {
                Some(SubmitOutcome::Answered(_)) => {}
                _ => return Ok(ExitCode::FAILURE),
            }
        }
        Command::Chat => {
            let mut session = open_session(client, &config, cli.no_color).await;
            session
                .run(BufReader::new(tokio::io::stdin()), &mut stdout)
                .await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn open_session(
    client: Arc<HttpResearchClient>,
    config: &ChatConfig,
    no_color: bool,
) -> ChatSession {
    let theme = ThemeController::load(open_preferences(config).await).await;
    let color = !no_color && std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
    ChatSession::new(client, theme, config, color)
}

async fn open_preferences(config: &ChatConfig) -> Arc<dyn PreferenceStore> {
    let Some(url) = config.preferences_database_url.as_deref() else {
        return Arc::new(MemoryPreferenceStore::new());
    };
    match Storage::new(url).await {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            warn!(error = %format!("{err:#}"), url, "preferences unavailable; theme changes will not persist");
            Arc::new(MemoryPreferenceStore::new())
        }
    }
}
