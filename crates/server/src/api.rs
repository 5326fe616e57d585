//! JSON endpoints.
//!
//! - `POST /ingest` (alias `POST /api/slack/events`) - inbound chat events, always acknowledged
//! - `GET  /messages`                                - newest stored messages
//! - `GET  /summary`                                 - `{summary}`
//! - `GET  /sentiment`                               - `{sentiment: {score, summary} | null}`
//! - `GET  /actionItems`                             - `{actionItems: [...]}`
//! - `GET  /miscommunications`                       - `{flaggedMessages: [...]}`
//!
//! Analysis endpoints accept `?prompt=` to replace the instruction text for
//! that one request.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use huddle_agent::pipeline::{
    AnalysisPipeline, AnalysisTask, ACTION_ITEMS, MISCOMMUNICATIONS, SENTIMENT, SUMMARY,
};
use huddle_core::domain::analysis::{
    ActionItemsReport, MiscommunicationReport, SentimentReport, SummaryReport,
};
use huddle_core::domain::message::{ChatMessage, SortOrder};
use huddle_core::errors::{ApplicationError, InterfaceError};
use huddle_core::prompts::PromptSet;
use huddle_db::MessageRepository;
use huddle_slack::events::{
    default_dispatcher, parse_payload, DispatchError, EventContext, EventDispatcher, HandlerResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::request_id::RequestId;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageRepository>,
    pub dispatcher: Arc<EventDispatcher>,
    pub pipeline: AnalysisPipeline,
    pub messages_limit: u32,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MessageRepository>,
        pipeline: AnalysisPipeline,
        messages_limit: u32,
    ) -> Self {
        let dispatcher = Arc::new(default_dispatcher(store.clone()));
        Self { store, dispatcher, pipeline, messages_limit }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub order: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptQuery {
    pub prompt: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/api/slack/events", post(ingest))
        .route("/messages", get(list_messages))
        .route("/summary", get(summary))
        .route("/sentiment", get(sentiment))
        .route("/actionItems", get(action_items))
        .route("/miscommunications", get(miscommunications))
        .with_state(state)
}

/// Slack retries any delivery that is not acknowledged, so every outcome,
/// including unparseable bodies and store failures, answers `{ok: true}`.
async fn ingest(
    State(state): State<AppState>,
    request_id: RequestId,
    body: Bytes,
) -> Json<Value> {
    let acknowledged = Json(json!({ "ok": true }));

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingest.payload.unparseable",
                correlation_id = %request_id.as_str(),
                error = %error,
                "ignoring ingest body that is not JSON"
            );
            return acknowledged;
        }
    };

    let event = parse_payload(&payload);
    let ctx = EventContext { correlation_id: request_id.0.clone() };

    match state.dispatcher.dispatch(&event, &ctx).await {
        Ok(HandlerResult::Challenge(challenge)) => Json(json!({ "challenge": challenge })),
        Ok(HandlerResult::Stored) | Ok(HandlerResult::Ignored) => acknowledged,
        Err(DispatchError::Handler(source)) => {
            error!(
                event_name = "ingest.message.store_failed",
                correlation_id = %request_id.as_str(),
                error = %source,
                "failed to store inbound message"
            );
            acknowledged
        }
    }
}

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    request_id: RequestId,
) -> ApiResult<Vec<ChatMessage>> {
    let order = match query.order.as_deref() {
        Some(raw) => raw.parse::<SortOrder>().map_err(|message| {
            interface_error(ApplicationError::InvalidRequest(message), "", &request_id)
        })?,
        None => SortOrder::Descending,
    };
    let limit = match query.limit.as_deref() {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            interface_error(
                ApplicationError::InvalidRequest(format!(
                    "invalid limit `{raw}`: expected a non-negative integer"
                )),
                "",
                &request_id,
            )
        })?,
        None => state.messages_limit,
    }
    .clamp(1, state.messages_limit);

    let messages = state.store.recent(limit, order).await.map_err(|source| {
        interface_error(ApplicationError::DataUnavailable(source.to_string()), "", &request_id)
    })?;

    info!(
        event_name = "api.messages.listed",
        correlation_id = %request_id.as_str(),
        count = messages.len(),
        order = order.as_sql(),
        "messages listed"
    );
    Ok(Json(messages))
}

async fn summary(
    State(state): State<AppState>,
    Query(query): Query<PromptQuery>,
    request_id: RequestId,
) -> ApiResult<SummaryReport> {
    run_analysis(&state.pipeline, &SUMMARY, query.prompt.as_deref(), &request_id).await
}

async fn sentiment(
    State(state): State<AppState>,
    Query(query): Query<PromptQuery>,
    request_id: RequestId,
) -> ApiResult<SentimentReport> {
    run_analysis(&state.pipeline, &SENTIMENT, query.prompt.as_deref(), &request_id).await
}

async fn action_items(
    State(state): State<AppState>,
    Query(query): Query<PromptQuery>,
    request_id: RequestId,
) -> ApiResult<ActionItemsReport> {
    run_analysis(&state.pipeline, &ACTION_ITEMS, query.prompt.as_deref(), &request_id).await
}

async fn miscommunications(
    State(state): State<AppState>,
    Query(query): Query<PromptQuery>,
    request_id: RequestId,
) -> ApiResult<MiscommunicationReport> {
    run_analysis(&state.pipeline, &MISCOMMUNICATIONS, query.prompt.as_deref(), &request_id).await
}

async fn run_analysis<T: AnalysisTask>(
    pipeline: &AnalysisPipeline,
    task: &T,
    prompt: Option<&str>,
    request_id: &RequestId,
) -> ApiResult<T::Output> {
    let prompts = PromptSet::default().with_override(task.key(), prompt);
    pipeline
        .run(task, prompts.get(task.key()), request_id.as_str())
        .await
        .map(Json)
        .map_err(|source| {
            interface_error(ApplicationError::from(source), task.failure_message(), request_id)
        })
}

fn interface_error(
    source: ApplicationError,
    failure_message: &str,
    request_id: &RequestId,
) -> (StatusCode, Json<ApiError>) {
    let detail = source.to_string();
    let interface = source.into_interface(failure_message, request_id.as_str());
    let status = match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    error!(
        event_name = "api.request.failed",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %detail,
        "request failed"
    );
    (status, Json(ApiError { error: interface.public_message().to_string() }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use huddle_agent::llm::{CompletionRequest, LlmClient, LlmError};
    use huddle_agent::pipeline::{AnalysisPipeline, DEFAULT_WINDOW_SIZE};
    use huddle_core::domain::message::{ChatMessage, SortOrder};
    use huddle_db::{InMemoryMessageRepository, MessageRepository, RepositoryError};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, AppState};

    struct CannedLlm {
        reply: Result<Option<&'static str>, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedLlm {
        fn text(text: &'static str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(Some(text)), prompts: Mutex::new(Vec::new()) })
        }

        fn status(status: u16) -> Arc<Self> {
            Arc::new(Self { reply: Err(status), prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError> {
            self.prompts.lock().expect("lock").push(request.prompt.clone());
            match self.reply {
                Ok(text) => Ok(text.map(str::to_string)),
                Err(status) => Err(LlmError::Status { status, body: "upstream down".to_string() }),
            }
        }

        fn provider_name(&self) -> &'static str {
            "canned"
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl MessageRepository for UnavailableStore {
        async fn append(&self, _message: ChatMessage) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("offline".to_string()))
        }

        async fn recent(
            &self,
            _limit: u32,
            _order: SortOrder,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            Err(RepositoryError::Unavailable("offline".to_string()))
        }
    }

    fn scenario_store() -> Arc<InMemoryMessageRepository> {
        Arc::new(InMemoryMessageRepository::with_messages(vec![
            ChatMessage::new("ship by Friday", "A", "1", "C1"),
            ChatMessage::new("maybe", "B", "2", "C1"),
        ]))
    }

    fn app(store: Arc<dyn MessageRepository>, llm: Arc<CannedLlm>, messages_limit: u32) -> Router {
        let pipeline = AnalysisPipeline::new(store.clone(), llm, DEFAULT_WINDOW_SIZE);
        router(AppState::new(store, pipeline, messages_limit))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        read_json(response).await
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        read_json(response).await
    }

    async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn handshake_echoes_challenge_without_storing() {
        let store = Arc::new(InMemoryMessageRepository::default());
        let app = app(store.clone(), CannedLlm::text("{}"), 20);

        let (status, body) = post_json(
            app,
            "/ingest",
            r#"{"type":"url_verification","token":"t","challenge":"3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P" })
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn message_event_stores_exactly_one_message_verbatim() {
        let store = Arc::new(InMemoryMessageRepository::default());
        let app = app(store.clone(), CannedLlm::text("{}"), 20);

        let (status, body) = post_json(
            app,
            "/api/slack/events",
            r#"{"type":"event_callback","event":{"type":"message","channel":"C024BE91L","user":"U2147483697","text":"Live long and prosper  :spock-hand:","ts":"1355517523.000005"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        let stored = store.recent(10, SortOrder::Ascending).await.expect("recent");
        assert_eq!(
            stored,
            vec![ChatMessage::new(
                "Live long and prosper  :spock-hand:",
                "U2147483697",
                "1355517523.000005",
                "C024BE91L"
            )]
        );
    }

    #[tokio::test]
    async fn unsupported_events_are_acknowledged_and_ignored() {
        let store = Arc::new(InMemoryMessageRepository::default());
        let app = app(store.clone(), CannedLlm::text("{}"), 20);

        let (status, body) = post_json(
            app,
            "/ingest",
            r#"{"type":"event_callback","event":{"type":"reaction_added","user":"U1"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn non_json_ingest_body_is_acknowledged_and_ignored() {
        let store = Arc::new(InMemoryMessageRepository::default());
        let app = app(store.clone(), CannedLlm::text("{}"), 20);

        let (status, body) = post_json(app, "/ingest", "token=abc&challenge=xyz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn ingest_store_failure_is_still_acknowledged() {
        let app = app(Arc::new(UnavailableStore), CannedLlm::text("{}"), 20);

        let (status, body) = post_json(
            app,
            "/ingest",
            r#"{"event":{"type":"message","channel":"C1","user":"A","text":"hi","ts":"1"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn messages_are_capped_and_ordered() {
        let store = Arc::new(InMemoryMessageRepository::with_messages(
            (1..=30).map(|n| ChatMessage::new(format!("m{n}"), "A", format!("{n:03}"), "C1")),
        ));
        let llm = CannedLlm::text("{}");

        let (status, body) = get(app(store.clone(), llm.clone(), 20), "/messages").await;
        assert_eq!(status, StatusCode::OK);
        let listed = body.as_array().expect("array");
        assert_eq!(listed.len(), 20);
        assert_eq!(listed[0]["ts"], "030");
        assert_eq!(listed[19]["ts"], "011");
        assert_eq!(listed[0]["channel"], "C1");

        let (_, body) = get(app(store.clone(), llm.clone(), 20), "/messages?order=asc&limit=500").await;
        let listed = body.as_array().expect("array");
        assert_eq!(listed.len(), 20);
        assert_eq!(listed[0]["ts"], "011");
        assert_eq!(listed[19]["ts"], "030");

        let (status, _) = get(app(store, llm, 20), "/messages?order=sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_messages_limit_is_json_bad_request() {
        let store = scenario_store();
        let llm = CannedLlm::text("{}");

        for uri in ["/messages?limit=abc", "/messages?limit=-1"] {
            let (status, body) = get(app(store.clone(), llm.clone(), 20), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].as_str().expect("error").contains("invalid limit"), "{uri}");
        }

        let (status, body) = get(app(store, llm, 20), "/messages?limit=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().expect("array").len(), 1);
    }

    #[tokio::test]
    async fn messages_store_failure_is_server_error() {
        let (status, body) = get(app(Arc::new(UnavailableStore), CannedLlm::text("{}"), 20), "/messages").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Could not fetch messages" }));
    }

    #[tokio::test]
    async fn miscommunications_returns_canned_flags_unmodified() {
        let llm = CannedLlm::text(r#"{"flaggedMessages":[{"ts":"2","reason":"Vague commitment"}]}"#);

        let (status, body) = get(app(scenario_store(), llm, 20), "/miscommunications").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "flaggedMessages": [{ "ts": "2", "reason": "Vague commitment" }] }));
    }

    #[tokio::test]
    async fn repeated_sentiment_requests_agree() {
        let store = scenario_store();
        let llm = CannedLlm::text(r#"{"score":4,"summary":"Some hesitation."}"#);

        let (_, first) = get(app(store.clone(), llm.clone(), 20), "/sentiment").await;
        let (status, second) = get(app(store, llm, 20), "/sentiment").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);
        assert_eq!(first, json!({ "sentiment": { "score": 4, "summary": "Some hesitation." } }));
    }

    #[tokio::test]
    async fn upstream_failure_is_server_error_except_for_summary() {
        let store = scenario_store();

        for (uri, message) in [
            ("/sentiment", "Failed to analyze sentiment"),
            ("/actionItems", "Failed to generate action items"),
            ("/miscommunications", "Failed to analyze messages"),
        ] {
            let (status, body) = get(app(store.clone(), CannedLlm::status(503), 20), uri).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body, json!({ "error": message }), "{uri}");
        }

        let (status, body) = get(app(store, CannedLlm::status(503), 20), "/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "summary": "No summary available." }));
    }

    #[tokio::test]
    async fn analysis_store_failure_returns_no_partial_result() {
        for uri in ["/summary", "/sentiment", "/actionItems", "/miscommunications"] {
            let llm = CannedLlm::text("{}");
            let (status, body) = get(app(Arc::new(UnavailableStore), llm.clone(), 20), uri).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body, json!({ "error": "Could not fetch messages" }), "{uri}");
            assert!(llm.prompts().is_empty(), "{uri}");
        }
    }

    #[tokio::test]
    async fn empty_model_answer_is_neutral() {
        let store = scenario_store();
        let llm = Arc::new(CannedLlm { reply: Ok(None), prompts: Mutex::new(Vec::new()) });

        let (status, body) = get(app(store.clone(), llm.clone(), 20), "/actionItems").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "actionItems": [] }));

        let (_, body) = get(app(store, llm, 20), "/sentiment").await;
        assert_eq!(body, json!({ "sentiment": null }));
    }

    #[tokio::test]
    async fn prompt_query_replaces_instruction_text() {
        let llm = CannedLlm::text(r#"{"actionItems":[{"task":"Ship","suggestedOwner":null}]}"#);

        let (status, body) =
            get(app(scenario_store(), llm.clone(), 20), "/actionItems?prompt=List%20todos").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "actionItems": [{ "task": "Ship", "suggestedOwner": null }] }));
        assert_eq!(llm.prompts(), vec!["List todos\n\nA: ship by Friday\nB: maybe\n".to_string()]);
    }
}
