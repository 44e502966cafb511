//! Input lines typed at the chat prompt, parsed into REPL commands.

use client_core::DEFAULT_HISTORY_LIMIT;
use shared::{domain::DetailLevel, error::ParseSettingError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Clear,
    Export,
    ToggleTheme,
    SetSources(u32),
    SetDetail(DetailLevel),
    ShowSettings,
    Health,
    History(u32),
    Analytics,
    Help,
    Quit,
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '/{0}'; type /help for the list")]
    Unknown(String),
    #[error("/{command} expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
    #[error(transparent)]
    InvalidSetting(#[from] ParseSettingError),
}

pub const HELP_TEXT: &str = "\
Type a question and press Enter to research it.

Commands:
  /clear            discard the conversation (asks for confirmation)
  /export           save the conversation as a text file
  /theme            switch between light and dark mode
  /sources N        number of sources per query (3, 5, 7 or 10 suggested)
  /detail LEVEL     brief, moderate or comprehensive
  /settings         show the current request settings
  /health           check the research service
  /history [N]      show the service's recent research history
  /analytics        show service usage analytics
  /help             show this help
  /quit             leave";

pub fn parse_line(line: &str) -> Result<ReplCommand, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ReplCommand::Nothing);
    }

    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(ReplCommand::Ask(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let argument = parts.next();

    let command = match name.as_str() {
        "clear" => ReplCommand::Clear,
        "export" => ReplCommand::Export,
        "theme" | "dark" => ReplCommand::ToggleTheme,
        "sources" => {
            let raw = argument.ok_or(CommandError::MissingArgument {
                command: "sources",
                expected: "a positive number",
            })?;
            let count = parse_number(raw)?;
            if count == 0 {
                return Err(ParseSettingError::NonPositiveSourceCount.into());
            }
            ReplCommand::SetSources(count)
        }
        "detail" => {
            let raw = argument.ok_or(CommandError::MissingArgument {
                command: "detail",
                expected: "brief, moderate or comprehensive",
            })?;
            ReplCommand::SetDetail(raw.parse()?)
        }
        "settings" => ReplCommand::ShowSettings,
        "health" => ReplCommand::Health,
        "history" => match argument {
            Some(raw) => ReplCommand::History(parse_number(raw)?),
            None => ReplCommand::History(DEFAULT_HISTORY_LIMIT),
        },
        "analytics" => ReplCommand::Analytics,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_number(raw: &str) -> Result<u32, CommandError> {
    raw.parse::<u32>()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}
