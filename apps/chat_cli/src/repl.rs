use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Local;
use client_core::{
    ConversationConfig, ConversationController, HttpResearchClient, SubmitOutcome,
    ThemeController,
};
use shared::domain::Settings;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::{
    commands::{parse_line, ReplCommand, HELP_TEXT},
    config::ChatConfig,
    view::{render_health, render_history, render_settings, render_turn, Palette},
};

/// One interactive chat: the conversation, request settings and presentation mode.
pub struct ChatSession {
    client: Arc<HttpResearchClient>,
    controller: ConversationController,
    theme: ThemeController,
    settings: Settings,
    export_dir: PathBuf,
    color: bool,
}

impl ChatSession {
    pub fn new(
        client: Arc<HttpResearchClient>,
        theme: ThemeController,
        config: &ChatConfig,
        color: bool,
    ) -> Self {
        let controller = ConversationController::new(
            client.clone(),
            ConversationConfig {
                min_question_chars: config.min_question_chars,
            },
        );
        Self {
            client,
            controller,
            theme,
            settings: config.settings(),
            export_dir: config.export_dir.clone(),
            color,
        }
    }

    fn palette(&self) -> Palette {
        Palette::for_theme(self.theme.theme(), self.color)
    }

    /// Submits one question and prints the resulting assistant turn.
    ///
    /// Returns `None` when the question was rejected before reaching the service.
    pub async fn ask<W: Write>(&self, question: &str, out: &mut W) -> Result<Option<SubmitOutcome>> {
        let palette = self.palette();
        writeln!(out, "{}", palette.paint(palette.muted, "Researching..."))?;
        out.flush()?;

        match self.controller.submit(question, self.settings).await {
            Ok(outcome) => {
                if let Some(turn) = self.controller.turns().await.last() {
                    if !turn.is_user() {
                        writeln!(out, "{}", render_turn(turn, &palette))?;
                    }
                }
                Ok(Some(outcome))
            }
            Err(err) => {
                writeln!(out, "{}", palette.paint(palette.error, &err.to_string()))?;
                Ok(None)
            }
        }
    }

    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        writeln!(
            out,
            "Research chat connected to {}. Type /help for commands.",
            self.client.base_url()
        )?;

        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                debug!("input closed; leaving chat");
                break;
            };

            let command = match parse_line(&line) {
                Ok(command) => command,
                Err(err) => {
                    let palette = self.palette();
                    writeln!(out, "{}", palette.paint(palette.error, &err.to_string()))?;
                    continue;
                }
            };

            match command {
                ReplCommand::Nothing => {}
                ReplCommand::Ask(question) => {
                    self.ask(&question, out).await?;
                }
                ReplCommand::Clear => {
                    if self.controller.turn_count().await == 0 {
                        writeln!(out, "Nothing to clear.")?;
                        continue;
                    }
                    write!(out, "Clear the conversation? [y/N] ")?;
                    out.flush()?;
                    let answer = lines.next_line().await?.unwrap_or_default();
                    let confirmed =
                        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
                    if self.controller.clear(|| confirmed).await {
                        writeln!(out, "Conversation cleared.")?;
                    } else {
                        writeln!(out, "Kept the conversation.")?;
                    }
                }
                ReplCommand::Export => {
                    let transcript = self.controller.export_transcript(Local::now()).await;
                    if transcript.is_empty() {
                        writeln!(out, "Nothing to export yet.")?;
                        continue;
                    }
                    match transcript.write_to_dir(&self.export_dir) {
                        Ok(path) => writeln!(out, "Saved transcript to {}", path.display())?,
                        Err(err) => writeln!(out, "Export failed: {err:#}")?,
                    }
                }
                ReplCommand::ToggleTheme => {
                    let theme = self.theme.toggle().await;
                    writeln!(
                        out,
                        "Switched to {} mode.",
                        if theme.is_dark() { "dark" } else { "light" }
                    )?;
                }
                ReplCommand::SetSources(count) => match self.settings.with_num_sources(count) {
                    Ok(settings) => {
                        self.settings = settings;
                        writeln!(out, "{}", render_settings(&self.settings, self.theme.theme()))?;
                    }
                    Err(err) => writeln!(out, "{err}")?,
                },
                ReplCommand::SetDetail(level) => {
                    self.settings = self.settings.with_detail_level(level);
                    writeln!(out, "{}", render_settings(&self.settings, self.theme.theme()))?;
                }
                ReplCommand::ShowSettings => {
                    writeln!(out, "{}", render_settings(&self.settings, self.theme.theme()))?;
                }
                ReplCommand::Health => match self.client.health().await {
                    Ok(report) => writeln!(out, "{}", render_health(&report))?,
                    Err(err) => writeln!(out, "Health check failed: {err}")?,
                },
                ReplCommand::History(limit) => match self.client.history(limit).await {
                    Ok(page) => writeln!(out, "{}", render_history(&page))?,
                    Err(err) => writeln!(out, "Could not load history: {err}")?,
                },
                ReplCommand::Analytics => match self.client.analytics().await {
                    Ok(value) => writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?,
                    Err(err) => writeln!(out, "Could not load analytics: {err}")?,
                },
                ReplCommand::Help => writeln!(out, "{HELP_TEXT}")?,
                ReplCommand::Quit => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/repl_tests.rs"]
mod tests;
