use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    error::ServiceErrorBody,
    protocol::{HealthReport, HistoryPage, ResearchRequest, ResearchResponse},
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub mod conversation;
pub mod normalize;
pub mod theme;
pub mod transcript;

pub use conversation::{
    ConversationConfig, ConversationController, RequestPhase, SubmitError, SubmitOutcome,
};
pub use normalize::clean_answer;
pub use theme::ThemeController;
pub use transcript::Transcript;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchErrorKind {
    InvalidUrl,
    Timeout,
    Service,
    Transport,
    Decode,
    Aborted,
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("invalid research service url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("research request timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("{detail}")]
    ServiceDetail { status: u16, detail: String },
    #[error("Request failed with status code {status}")]
    ServiceStatus { status: u16 },
    #[error("{0}")]
    Transport(String),
    #[error("unexpected response from research service: {0}")]
    Decode(String),
    #[error("research request was cancelled")]
    Aborted,
}

impl ResearchError {
    /// Non-2xx reply; `detail` comes from the service error body when it had one.
    pub fn service(status: u16, detail: Option<String>) -> Self {
        match detail {
            Some(detail) => ResearchError::ServiceDetail { status, detail },
            None => ResearchError::ServiceStatus { status },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ResearchError::ServiceDetail { status, .. } | ResearchError::ServiceStatus { status } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ResearchErrorKind {
        match self {
            ResearchError::InvalidUrl { .. } => ResearchErrorKind::InvalidUrl,
            ResearchError::Timeout(_) => ResearchErrorKind::Timeout,
            ResearchError::ServiceDetail { .. } | ResearchError::ServiceStatus { .. } => {
                ResearchErrorKind::Service
            }
            ResearchError::Transport(_) => ResearchErrorKind::Transport,
            ResearchError::Decode(_) => ResearchErrorKind::Decode,
            ResearchError::Aborted => ResearchErrorKind::Aborted,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ResearchError::Timeout(timeout)
        } else if err.is_decode() {
            ResearchError::Decode(err.to_string())
        } else {
            ResearchError::Transport(err.to_string())
        }
    }
}

/// The remote research engine: takes a question, returns a synthesized answer.
#[async_trait]
pub trait ResearchService: Send + Sync {
    async fn research(&self, request: &ResearchRequest)
        -> Result<ResearchResponse, ResearchError>;
}

pub struct HttpResearchClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpResearchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResearchError> {
        let base_url = normalize_base_url(base_url)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ResearchError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, path: &str) -> Result<Url, ResearchError> {
        self.base_url
            .join(path)
            .map_err(|err| ResearchError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ResearchError> {
        let status = response.status();
        if !status.is_success() {
            // The error body is best effort; a missing or non-JSON body falls back to the status.
            let detail = match response.bytes().await {
                Ok(body) => serde_json::from_slice::<ServiceErrorBody>(&body)
                    .ok()
                    .and_then(|body| body.detail_message()),
                Err(_) => None,
            };
            return Err(ResearchError::service(status.as_u16(), detail));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ResearchError::from_reqwest(err, self.timeout))?;
        serde_json::from_slice(&body).map_err(|err| ResearchError::Decode(err.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ResearchError> {
        debug!(%url, "GET research service endpoint");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ResearchError::from_reqwest(err, self.timeout))?;
        self.decode(response).await
    }

    pub async fn health(&self) -> Result<HealthReport, ResearchError> {
        self.get_json(self.endpoint("health")?).await
    }

    pub async fn history(&self, limit: u32) -> Result<HistoryPage, ResearchError> {
        let mut url = self.endpoint("history")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    /// Usage analytics; the payload shape is owned by the service and passed through untouched.
    pub async fn analytics(&self) -> Result<serde_json::Value, ResearchError> {
        self.get_json(self.endpoint("analytics")?).await
    }
}

#[async_trait]
impl ResearchService for HttpResearchClient {
    async fn research(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchResponse, ResearchError> {
        let url = self.endpoint("research")?;
        info!(
            %url,
            num_sources = request.num_sources,
            detail_level = %request.detail_level,
            "posting research question"
        );
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| ResearchError::from_reqwest(err, self.timeout))?;
        self.decode(response).await
    }
}

/// Parses the configured base url and makes sure relative joins append to its path.
fn normalize_base_url(raw: &str) -> Result<Url, ResearchError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|err| ResearchError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ResearchError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
