//! Conversation controller: owns the turn log and the single in-flight research request.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::{AbortHandle, Abortable};
use shared::{
    domain::{Settings, Turn, TurnId, TurnMetadata},
    protocol::{ResearchRequest, ResearchResponse},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{transcript::Transcript, ResearchError, ResearchErrorKind, ResearchService};

/// Model label used when the service does not report which model answered.
pub const DEFAULT_MODEL_NAME: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Minimum question length in characters after trimming. Values below 1 act as 1.
    pub min_question_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            min_question_chars: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Sending,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("question must be at least {min_chars} character(s) long after trimming whitespace")]
    Validation { min_chars: usize },
    #[error("a research request is already in flight; wait for it to finish")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered(TurnId),
    Failed {
        turn_id: TurnId,
        kind: ResearchErrorKind,
    },
    /// The conversation was cleared while the request was in flight; nothing was appended.
    Discarded,
}

struct ConversationState {
    turns: Vec<Turn>,
    phase: RequestPhase,
    generation: u64,
    in_flight: Option<AbortHandle>,
    last_turn_id: i64,
}

impl ConversationState {
    /// Millisecond timestamps, bumped so ids stay strictly increasing within a session.
    fn next_turn_id(&mut self, now: DateTime<Utc>) -> TurnId {
        let candidate = now.timestamp_millis().max(self.last_turn_id + 1);
        self.last_turn_id = candidate;
        TurnId(candidate)
    }
}

pub struct ConversationController {
    service: Arc<dyn ResearchService>,
    config: ConversationConfig,
    state: Arc<Mutex<ConversationState>>,
}

impl ConversationController {
    pub fn new(service: Arc<dyn ResearchService>, config: ConversationConfig) -> Self {
        Self {
            service,
            config,
            state: Arc::new(Mutex::new(ConversationState {
                turns: Vec::new(),
                phase: RequestPhase::Idle,
                generation: 0,
                in_flight: None,
                last_turn_id: 0,
            })),
        }
    }

    pub fn config(&self) -> ConversationConfig {
        self.config
    }

    fn validate(&self, question: &str) -> Result<(), SubmitError> {
        let min_chars = self.config.min_question_chars.max(1);
        if question.trim().chars().count() < min_chars {
            return Err(SubmitError::Validation { min_chars });
        }
        Ok(())
    }

    /// Appends the question, asks the research service, and appends exactly one answer turn.
    ///
    /// Service failures never surface as `Err`: they become an assistant turn
    /// carrying the error text. `Err` is only returned when nothing was appended.
    /// The request runs on its own task, so dropping this future still settles
    /// the conversation once the service replies.
    pub async fn submit(
        &self,
        question: &str,
        settings: Settings,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.validate(question)?;

        let (registration, generation) = {
            let mut state = self.state.lock().await;
            if state.phase == RequestPhase::Sending {
                debug!("rejecting submit while a research request is in flight");
                return Err(SubmitError::Busy);
            }

            let now = Utc::now();
            let id = state.next_turn_id(now);
            state.turns.push(Turn::user(id, question, now));
            state.phase = RequestPhase::Sending;

            let (handle, registration) = AbortHandle::new_pair();
            state.in_flight = Some(handle);
            (registration, state.generation)
        };

        let request = ResearchRequest::new(question, settings);
        let service = self.service.clone();
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            let result = Abortable::new(service.research(&request), registration)
                .await
                .unwrap_or(Err(ResearchError::Aborted));
            settle(&state, generation, result).await
        });

        match task.await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(error = %err, "research task ended without settling");
                Ok(settle(&self.state, generation, Err(ResearchError::Aborted)).await)
            }
        }
    }

    /// Discards every turn once `confirm` agrees. An in-flight request is aborted
    /// and its late result is dropped. Returns whether anything was cleared.
    pub async fn clear(&self, confirm: impl FnOnce() -> bool) -> bool {
        if !confirm() {
            debug!("clear declined");
            return false;
        }

        let mut state = self.state.lock().await;
        if let Some(handle) = state.in_flight.take() {
            info!("aborting in-flight research request");
            handle.abort();
        }
        state.turns.clear();
        state.phase = RequestPhase::Idle;
        state.generation += 1;
        true
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.state.lock().await.turns.clone()
    }

    pub async fn turn_count(&self) -> usize {
        self.state.lock().await.turns.len()
    }

    pub async fn phase(&self) -> RequestPhase {
        self.state.lock().await.phase
    }

    pub async fn is_loading(&self) -> bool {
        self.phase().await == RequestPhase::Sending
    }

    /// Plain-text transcript of the conversation, timestamps rendered in `exported_at`'s zone.
    pub async fn export_transcript<Tz>(&self, exported_at: DateTime<Tz>) -> Transcript
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let state = self.state.lock().await;
        Transcript::render(&state.turns, &exported_at)
    }
}

/// Records the reply for `generation` and returns to idle. A reply for a
/// cleared conversation, or one already settled, appends nothing.
async fn settle(
    state: &Mutex<ConversationState>,
    generation: u64,
    result: Result<ResearchResponse, ResearchError>,
) -> SubmitOutcome {
    let mut state = state.lock().await;
    if state.generation != generation || state.phase != RequestPhase::Sending {
        debug!("dropping research result for a cleared conversation");
        return SubmitOutcome::Discarded;
    }
    state.phase = RequestPhase::Idle;
    state.in_flight = None;

    let now = Utc::now();
    let id = state.next_turn_id(now);
    match result {
        Ok(response) => {
            info!(
                turn_id = id.0,
                sources = response.sources.as_ref().map_or(0, Vec::len),
                processing_time = response.processing_time,
                "research answer received"
            );
            state.turns.push(answer_turn(id, now, response));
            SubmitOutcome::Answered(id)
        }
        Err(err) => {
            warn!(turn_id = id.0, error = %err, "research request failed");
            let kind = err.kind();
            state
                .turns
                .push(Turn::assistant(id, failure_message(&err), now, Vec::new(), None));
            SubmitOutcome::Failed { turn_id: id, kind }
        }
    }
}

fn answer_turn(id: TurnId, now: DateTime<Utc>, response: ResearchResponse) -> Turn {
    let metadata = TurnMetadata {
        processing_time_seconds: response.processing_time,
        queries_used: response.queries_used,
        model_name: response
            .model_used
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
    };
    Turn::assistant(
        id,
        response.answer,
        now,
        response.sources.unwrap_or_default(),
        Some(metadata),
    )
}

pub fn failure_message(err: &ResearchError) -> String {
    format!("Sorry, I encountered an error: {err}. Please try again.")
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
