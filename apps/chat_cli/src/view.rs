//! Terminal rendering of turns. One renderer, styled by a palette derived from the theme.

use std::fmt::Write as _;

use chrono::Local;
use client_core::clean_answer;
use shared::{
    domain::{Settings, Theme, Turn},
    protocol::{HealthReport, HistoryPage},
};

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub user: &'static str,
    pub assistant: &'static str,
    pub body: &'static str,
    pub muted: &'static str,
    pub link: &'static str,
    pub error: &'static str,
    reset: &'static str,
}

impl Palette {
    pub fn for_theme(theme: Theme, color: bool) -> Self {
        if !color {
            return Self::plain();
        }
        match theme {
            Theme::Dark => Self {
                user: "\x1b[1;96m",
                assistant: "\x1b[1;95m",
                body: "\x1b[97m",
                muted: "\x1b[90m",
                link: "\x1b[4;94m",
                error: "\x1b[91m",
                reset: RESET,
            },
            Theme::Light => Self {
                user: "\x1b[1;34m",
                assistant: "\x1b[1;35m",
                body: "\x1b[30m",
                muted: "\x1b[37m",
                link: "\x1b[4;34m",
                error: "\x1b[31m",
                reset: RESET,
            },
        }
    }

    pub fn plain() -> Self {
        Self {
            user: "",
            assistant: "",
            body: "",
            muted: "",
            link: "",
            error: "",
            reset: "",
        }
    }

    pub fn paint(&self, style: &str, text: &str) -> String {
        if style.is_empty() {
            text.to_string()
        } else {
            format!("{style}{text}{}", self.reset)
        }
    }
}

pub fn render_turn(turn: &Turn, palette: &Palette) -> String {
    let time = turn.created_at().with_timezone(&Local).format("%H:%M");
    let mut out = String::new();

    if turn.is_user() {
        let _ = writeln!(
            out,
            "{} {}",
            palette.paint(palette.user, "You"),
            palette.paint(palette.muted, &time.to_string())
        );
        let _ = writeln!(out, "{}", palette.paint(palette.body, turn.content()));
        return out;
    }

    let _ = writeln!(
        out,
        "{} {}",
        palette.paint(palette.assistant, "Research Assistant"),
        palette.paint(palette.muted, &time.to_string())
    );
    let style = if turn.metadata().is_none() && turn.sources().is_empty() {
        palette.error
    } else {
        palette.body
    };
    let _ = writeln!(out, "{}", palette.paint(style, &clean_answer(turn.content())));

    if !turn.sources().is_empty() {
        let _ = writeln!(out, "\n{}", palette.paint(palette.muted, "SOURCES"));
        for (idx, source) in turn.sources().iter().enumerate() {
            let title = if source.title.is_empty() {
                source.url.as_str()
            } else {
                source.title.as_str()
            };
            let _ = writeln!(out, "[{}] {title}", idx + 1);
            let _ = writeln!(out, "    {}", palette.paint(palette.link, &source.url));
            if !source.snippet.is_empty() {
                let _ = writeln!(
                    out,
                    "    {}",
                    palette.paint(palette.muted, &truncate(&source.snippet, 160))
                );
            }
        }
    }

    if let Some(metadata) = turn.metadata() {
        let mut facts = vec![format!("{:.2}s", metadata.processing_time_seconds)];
        if !metadata.model_name.is_empty() {
            facts.push(metadata.model_name.clone());
        }
        if !metadata.queries_used.is_empty() {
            facts.push(format!("{} queries", metadata.queries_used.len()));
        }
        let _ = writeln!(out, "{}", palette.paint(palette.muted, &facts.join(" | ")));
    }

    out
}

pub fn render_settings(settings: &Settings, theme: Theme) -> String {
    format!(
        "sources: {} | detail: {} | theme: {}",
        settings.num_sources,
        settings.detail_level,
        if theme.is_dark() { "dark" } else { "light" }
    )
}

pub fn render_health(report: &HealthReport) -> String {
    let mut out = format!("status: {}", report.status);
    if let Some(timestamp) = &report.timestamp {
        let _ = write!(out, " (at {timestamp})");
    }
    for (name, value) in &report.components {
        let _ = write!(out, "\n  {name}: {value}");
    }
    out
}

pub fn render_history(page: &HistoryPage) -> String {
    let mut out = format!("{} item(s) stored on the service", page.total);
    for (idx, entry) in page.history.iter().enumerate() {
        let _ = write!(out, "\n{:>3}. {}", idx + 1, entry.question);
        if let Some(timestamp) = &entry.timestamp {
            let _ = write!(out, "  [{timestamp}]");
        }
        if !entry.answer.is_empty() {
            let _ = write!(out, "\n     {}", truncate(&clean_answer(&entry.answer), 120));
        }
    }
    out
}

/// Cuts `text` to at most `max_chars` characters on a char boundary, marking the cut.
fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", flat[..cut].trim_end()),
        None => flat,
    }
}
