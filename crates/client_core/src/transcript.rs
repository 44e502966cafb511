use std::{
    fmt::{Display, Write as _},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use shared::domain::Turn;

const TURN_SEPARATOR: &str = "\n---\n\n";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exported plain-text conversation, ready to be saved as `filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub filename: String,
    pub body: String,
}

impl Transcript {
    pub fn render<Tz>(turns: &[Turn], exported_at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let zone = exported_at.timezone();
        let body = turns
            .iter()
            .map(|turn| render_turn(turn, &zone))
            .collect::<Vec<_>>()
            .join(TURN_SEPARATOR);

        Self {
            filename: format!("research-chat-{}.txt", exported_at.date_naive().format("%Y-%m-%d")),
            body,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Writes the transcript into `dir`, creating it when missing.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export directory '{}'", dir.display()))?;
        let path = dir.join(&self.filename);
        fs::write(&path, &self.body)
            .with_context(|| format!("failed to write transcript '{}'", path.display()))?;
        Ok(path)
    }
}

fn render_turn<Tz>(turn: &Turn, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let timestamp = turn
        .created_at()
        .with_timezone(zone)
        .format(TIMESTAMP_FORMAT);
    let mut text = format!(
        "[{timestamp}] {}:\n{}\n",
        turn.origin().label(),
        turn.content()
    );

    if !turn.is_user() && !turn.sources().is_empty() {
        text.push_str("\nSources:\n");
        for (idx, source) in turn.sources().iter().enumerate() {
            let title = if source.title.is_empty() {
                source.url.as_str()
            } else {
                source.title.as_str()
            };
            let _ = writeln!(text, "{}. {title}\n   {}", idx + 1, source.url);
        }
    }

    text
}
