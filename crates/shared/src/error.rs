use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error payload returned by the research service on non-2xx responses.
///
/// `detail` is usually a string, but request validation failures carry a
/// list of `{loc, msg, type}` objects instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(Value::String(detail.into())),
            error: None,
        }
    }

    /// Human readable message: `detail` first, then the short `error` label.
    pub fn detail_message(&self) -> Option<String> {
        self.detail_text().or_else(|| {
            self.error
                .as_deref()
                .map(str::trim)
                .filter(|error| !error.is_empty())
                .map(str::to_string)
        })
    }

    fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
            Value::Array(items) => {
                let messages = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSettingError {
    #[error("unknown detail level '{0}' (expected brief, moderate or comprehensive)")]
    UnknownDetailLevel(String),
    #[error("number of sources must be a positive integer")]
    NonPositiveSourceCount,
}
