use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseSettingError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(TurnId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Assistant,
}

impl Origin {
    /// Speaker label used in transcripts and the terminal view.
    pub fn label(self) -> &'static str {
        match self {
            Origin::User => "You",
            Origin::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Brief,
    #[default]
    Moderate,
    Comprehensive,
}

impl DetailLevel {
    pub const ALL: [DetailLevel; 3] = [
        DetailLevel::Brief,
        DetailLevel::Moderate,
        DetailLevel::Comprehensive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Brief => "brief",
            DetailLevel::Moderate => "moderate",
            DetailLevel::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = ParseSettingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        DetailLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| ParseSettingError::UnknownDetailLevel(raw.to_string()))
    }
}

/// Source counts offered by the settings prompt. The service accepts any positive count.
pub const SOURCE_COUNT_PRESETS: [u32; 4] = [3, 5, 7, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub num_sources: u32,
    pub detail_level: DetailLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_sources: 5,
            detail_level: DetailLevel::Moderate,
        }
    }
}

impl Settings {
    pub fn with_num_sources(mut self, num_sources: u32) -> Result<Self, ParseSettingError> {
        if num_sources == 0 {
            return Err(ParseSettingError::NonPositiveSourceCount);
        }
        self.num_sources = num_sources;
        Ok(self)
    }

    pub fn with_detail_level(mut self, detail_level: DetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark_flag(dark: bool) -> Self {
        if dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// A citation returned by the research service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub processing_time_seconds: f64,
    pub queries_used: Vec<String>,
    pub model_name: String,
}

/// One message in the conversation log.
///
/// Turns are built once by the conversation controller and never mutated
/// afterwards; fields are read through accessors only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    id: TurnId,
    origin: Origin,
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<TurnMetadata>,
}

impl Turn {
    pub fn user(id: TurnId, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            origin: Origin::User,
            content: content.into(),
            created_at,
            sources: Vec::new(),
            metadata: None,
        }
    }

    pub fn assistant(
        id: TurnId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
        sources: Vec<Source>,
        metadata: Option<TurnMetadata>,
    ) -> Self {
        Self {
            id,
            origin: Origin::Assistant,
            content: content.into(),
            created_at,
            sources,
            metadata,
        }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn metadata(&self) -> Option<&TurnMetadata> {
        self.metadata.as_ref()
    }
}
