use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{DetailLevel, Settings, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub question: String,
    pub num_sources: u32,
    pub detail_level: DetailLevel,
}

impl ResearchRequest {
    pub fn new(question: impl Into<String>, settings: Settings) -> Self {
        Self {
            question: question.into(),
            num_sources: settings.num_sources,
            detail_level: settings.detail_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub queries_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Remaining service-specific fields, typically `<component>_configured` flags.
    #[serde(flatten)]
    pub components: Map<String, Value>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub queries_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}
