use super::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::TimeZone;
use shared::domain::{DetailLevel, Origin, Source};
use tokio::sync::Notify;

use crate::ResearchError;

enum Reply {
    Answer(ResearchResponse),
    Error(fn() -> ResearchError),
}

/// Research service double: counts calls, records requests, optionally waits for a release signal.
struct ScriptedService {
    reply: Reply,
    calls: AtomicUsize,
    requests: std::sync::Mutex<Vec<ResearchRequest>>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl ScriptedService {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
        let mut service = Self::new(reply);
        service.gate = Some(gate);
        service
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchService for ScriptedService {
    async fn research(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchResponse, ResearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.reply {
            Reply::Answer(response) => Ok(response.clone()),
            Reply::Error(make) => Err(make()),
        }
    }
}

fn sample_answer() -> ResearchResponse {
    ResearchResponse {
        answer: "X".to_string(),
        sources: Some(vec![Source {
            url: "http://a".to_string(),
            title: "A".to_string(),
            snippet: "s".to_string(),
            search_query: None,
        }]),
        processing_time: 1.5,
        queries_used: vec!["q1".to_string(), "q2".to_string()],
        model_used: Some("m".to_string()),
        question: None,
        timestamp: None,
    }
}

fn controller_with(service: Arc<ScriptedService>) -> ConversationController {
    ConversationController::new(service, ConversationConfig::default())
}

#[tokio::test]
async fn successful_submit_appends_user_then_assistant_turn() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service.clone());

    let outcome = controller
        .submit("What is X?", Settings::default())
        .await
        .expect("submit");

    let turns = controller.turns().await;
    assert_eq!(turns.len(), 2);
    assert!(matches!(outcome, SubmitOutcome::Answered(id) if id == turns[1].id()));

    assert_eq!(turns[0].origin(), Origin::User);
    assert_eq!(turns[0].content(), "What is X?");
    assert!(turns[0].sources().is_empty());
    assert!(turns[0].metadata().is_none());

    assert_eq!(turns[1].origin(), Origin::Assistant);
    assert_eq!(turns[1].content(), "X");
    assert_eq!(turns[1].sources().len(), 1);
    let metadata = turns[1].metadata().expect("metadata");
    assert_eq!(metadata.processing_time_seconds, 1.5);
    assert_eq!(metadata.queries_used, vec!["q1".to_string(), "q2".to_string()]);
    assert_eq!(metadata.model_name, "m");

    assert!(turns[0].id() < turns[1].id());
    assert!(turns[0].created_at() <= turns[1].created_at());
    assert_eq!(controller.phase().await, RequestPhase::Idle);
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn question_and_settings_are_forwarded_verbatim() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service.clone());
    let settings = Settings {
        num_sources: 10,
        detail_level: DetailLevel::Brief,
    };

    controller
        .submit("  spaced question ", settings)
        .await
        .expect("submit");

    let requests = service.requests.lock().expect("requests lock").clone();
    assert_eq!(
        requests,
        vec![ResearchRequest {
            question: "  spaced question ".to_string(),
            num_sources: 10,
            detail_level: DetailLevel::Brief,
        }]
    );
    assert_eq!(controller.turns().await[0].content(), "  spaced question ");
}

#[tokio::test]
async fn missing_sources_and_model_fall_back_to_defaults() {
    let mut response = sample_answer();
    response.sources = None;
    response.model_used = None;
    let service = Arc::new(ScriptedService::new(Reply::Answer(response)));
    let controller = controller_with(service);

    controller
        .submit("question", Settings::default())
        .await
        .expect("submit");

    let turns = controller.turns().await;
    assert!(turns[1].sources().is_empty());
    assert_eq!(
        turns[1].metadata().expect("metadata").model_name,
        DEFAULT_MODEL_NAME
    );
}

#[tokio::test]
async fn service_failure_becomes_assistant_turn_with_detail() {
    let service = Arc::new(ScriptedService::new(Reply::Error(|| {
        ResearchError::service(500, Some("overloaded".to_string()))
    })));
    let controller = controller_with(service);

    let outcome = controller
        .submit("question", Settings::default())
        .await
        .expect("failures are not raised");

    let turns = controller.turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            turn_id: turns[1].id(),
            kind: ResearchErrorKind::Service,
        }
    );
    assert_eq!(turns[1].origin(), Origin::Assistant);
    assert!(turns[1].content().contains("overloaded"));
    assert!(turns[1].sources().is_empty());
    assert!(turns[1].metadata().is_none());
    assert!(!controller.is_loading().await);
}

#[tokio::test]
async fn transport_failure_uses_transport_message() {
    let service = Arc::new(ScriptedService::new(Reply::Error(|| {
        ResearchError::Transport("connection refused".to_string())
    })));
    let controller = controller_with(service);

    controller
        .submit("question", Settings::default())
        .await
        .expect("submit");

    let turns = controller.turns().await;
    assert_eq!(
        turns[1].content(),
        "Sorry, I encountered an error: connection refused. Please try again."
    );
}

#[tokio::test]
async fn blank_questions_are_rejected_without_network_call() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service.clone());

    for question in ["", "   ", "\n\t "] {
        let err = controller
            .submit(question, Settings::default())
            .await
            .expect_err("must reject");
        assert_eq!(err, SubmitError::Validation { min_chars: 1 });
    }

    assert_eq!(controller.turn_count().await, 0);
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn configurable_minimum_length_counts_trimmed_characters() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = ConversationController::new(
        service.clone(),
        ConversationConfig {
            min_question_chars: 10,
        },
    );

    let err = controller
        .submit("   short   ", Settings::default())
        .await
        .expect_err("too short");
    assert_eq!(err, SubmitError::Validation { min_chars: 10 });
    assert_eq!(service.calls(), 0);

    controller
        .submit("long enough now", Settings::default())
        .await
        .expect("submit");
    assert_eq!(controller.turn_count().await, 2);
}

#[tokio::test]
async fn second_submit_is_rejected_while_sending() {
    let gate = Arc::new(Notify::new());
    let service = Arc::new(ScriptedService::gated(
        Reply::Answer(sample_answer()),
        gate.clone(),
    ));
    let entered = service.entered.clone();
    let controller = Arc::new(controller_with(service.clone()));

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit("first", Settings::default()).await }
    });
    entered.notified().await;

    assert!(controller.is_loading().await);
    let err = controller
        .submit("second", Settings::default())
        .await
        .expect_err("busy");
    assert_eq!(err, SubmitError::Busy);
    assert_eq!(controller.turn_count().await, 1);
    assert_eq!(service.calls(), 1);

    gate.notify_one();
    let outcome = first.await.expect("join").expect("submit");
    assert!(matches!(outcome, SubmitOutcome::Answered(_)));

    let turns = controller.turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content(), "first");
    assert_eq!(controller.phase().await, RequestPhase::Idle);

    // Idle again, so the next question goes through.
    let service_calls_before = service.calls();
    let next = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit("third", Settings::default()).await }
    });
    entered.notified().await;
    gate.notify_one();
    next.await.expect("join").expect("submit");
    assert_eq!(service.calls(), service_calls_before + 1);
    assert_eq!(controller.turn_count().await, 4);
}

#[tokio::test]
async fn declined_clear_keeps_turns() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service);
    controller
        .submit("question", Settings::default())
        .await
        .expect("submit");

    assert!(!controller.clear(|| false).await);
    assert_eq!(controller.turn_count().await, 2);

    assert!(controller.clear(|| true).await);
    assert_eq!(controller.turn_count().await, 0);
}

#[tokio::test]
async fn clearing_while_sending_aborts_and_discards_result() {
    let gate = Arc::new(Notify::new());
    let service = Arc::new(ScriptedService::gated(
        Reply::Answer(sample_answer()),
        gate.clone(),
    ));
    let entered = service.entered.clone();
    let controller = Arc::new(controller_with(service));

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit("question", Settings::default()).await }
    });
    entered.notified().await;

    assert!(controller.clear(|| true).await);
    let outcome = pending.await.expect("join").expect("submit");

    assert_eq!(outcome, SubmitOutcome::Discarded);
    assert_eq!(controller.turn_count().await, 0);
    assert_eq!(controller.phase().await, RequestPhase::Idle);
}

#[tokio::test]
async fn dropped_submit_still_settles_the_conversation() {
    let gate = Arc::new(Notify::new());
    let service = Arc::new(ScriptedService::gated(
        Reply::Answer(sample_answer()),
        gate.clone(),
    ));
    let controller = controller_with(service.clone());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        controller.submit("first", Settings::default()),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(controller.is_loading().await);

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.is_loading().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request settles after the caller gave up");

    let turns = controller.turns().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content(), "first");
    assert_eq!(turns[1].content(), "X");

    gate.notify_one();
    let outcome = controller
        .submit("second", Settings::default())
        .await
        .expect("controller accepts the next question");
    assert!(matches!(outcome, SubmitOutcome::Answered(_)));
    assert_eq!(controller.turn_count().await, 4);
    assert_eq!(service.calls(), 2);
}

#[tokio::test]
async fn turn_ids_stay_strictly_increasing() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service);
    for idx in 0..5 {
        controller
            .submit(&format!("question {idx}"), Settings::default())
            .await
            .expect("submit");
    }

    let ids = controller
        .turns()
        .await
        .iter()
        .map(|turn| turn.id())
        .collect::<Vec<_>>();
    assert_eq!(ids.len(), 10);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn export_contains_turns_sources_and_separator() {
    let service = Arc::new(ScriptedService::new(Reply::Answer(sample_answer())));
    let controller = controller_with(service);
    controller
        .submit("What is X?", Settings::default())
        .await
        .expect("submit");

    let exported_at = Utc
        .with_ymd_and_hms(2024, 6, 1, 9, 30, 0)
        .single()
        .expect("time");
    let transcript = controller.export_transcript(exported_at).await;

    assert_eq!(transcript.filename, "research-chat-2024-06-01.txt");
    assert!(transcript.body.contains("You:\nWhat is X?"));
    assert!(transcript.body.contains("Assistant:\nX"));
    assert!(transcript.body.contains("http://a"));
    assert!(transcript.body.contains("\n---\n"));
}
