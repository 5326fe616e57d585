//! Server-rendered dashboard at `GET /`.
//!
//! The page loads the newest messages and all four analyses concurrently and
//! renders each panel on its own, so one failed analysis only blanks its
//! panel. Prompt edits and action-item checkboxes live in the browser's local
//! storage; edited prompts come back as query parameters on refresh.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use huddle_agent::pipeline::{
    AnalysisError, AnalysisTask, ACTION_ITEMS, MISCOMMUNICATIONS, SENTIMENT, SUMMARY,
};
use huddle_core::domain::analysis::{MiscommunicationReport, SUMMARY_FALLBACK};
use huddle_core::domain::message::{ChatMessage, SortOrder};
use huddle_core::errors::{ApplicationError, DATA_UNAVAILABLE_MESSAGE};
use huddle_core::prompts::{PromptKey, PromptSet};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{error, warn};

use crate::api::AppState;
use crate::request_id::RequestId;

const TEMPLATE_NAME: &str = "index.html";

#[derive(Clone)]
pub struct DashboardState {
    app: AppState,
    templates: Arc<Tera>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub summary_prompt: Option<String>,
    pub sentiment_prompt: Option<String>,
    pub action_items_prompt: Option<String>,
    pub miscommunications_prompt: Option<String>,
}

impl DashboardQuery {
    pub fn prompt_set(&self) -> PromptSet {
        PromptSet::default()
            .with_override(PromptKey::Summary, self.summary_prompt.as_deref())
            .with_override(PromptKey::Sentiment, self.sentiment_prompt.as_deref())
            .with_override(PromptKey::ActionItems, self.action_items_prompt.as_deref())
            .with_override(PromptKey::Miscommunications, self.miscommunications_prompt.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct MessageView {
    text: String,
    user: String,
    ts: String,
    channel: String,
    flag_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct PromptView {
    key: &'static str,
    field: &'static str,
    label: &'static str,
    text: String,
    default_text: &'static str,
}

fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/dashboard/**/*") {
        Ok(tera) => tera,
        Err(error) => {
            warn!(error = %error, "failed to load dashboard templates from filesystem, using embedded copy");
            Tera::default()
        }
    };

    if !tera.get_template_names().any(|name| name == TEMPLATE_NAME) {
        if let Err(error) = tera.add_raw_template(
            TEMPLATE_NAME,
            include_str!("../../../templates/dashboard/index.html"),
        ) {
            error!(error = %error, "embedded dashboard template failed to parse");
        }
    }

    Arc::new(tera)
}

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .with_state(DashboardState { app, templates: init_templates() })
}

async fn dashboard_page(
    State(state): State<DashboardState>,
    Query(query): Query<DashboardQuery>,
    request_id: RequestId,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let prompts = query.prompt_set();
    let pipeline = &state.app.pipeline;
    let correlation_id = request_id.as_str();

    let (messages, summary, sentiment, action_items, flags) = tokio::join!(
        state.app.store.recent(state.app.messages_limit, SortOrder::Descending),
        pipeline.run(&SUMMARY, prompts.get(PromptKey::Summary), correlation_id),
        pipeline.run(&SENTIMENT, prompts.get(PromptKey::Sentiment), correlation_id),
        pipeline.run(&ACTION_ITEMS, prompts.get(PromptKey::ActionItems), correlation_id),
        pipeline.run(&MISCOMMUNICATIONS, prompts.get(PromptKey::Miscommunications), correlation_id),
    );

    let mut context = Context::new();

    let flags = panel(flags, &MISCOMMUNICATIONS, "flags", correlation_id, &mut context)
        .unwrap_or_default();
    let messages_error = messages.as_ref().err().map(|source| {
        warn!(
            event_name = "dashboard.panel.failed",
            correlation_id,
            panel = "messages",
            error = %source,
            "dashboard panel failed"
        );
        DATA_UNAVAILABLE_MESSAGE
    });
    context.insert("messages", &message_views(messages.unwrap_or_default(), &flags));
    context.insert("messages_error", &messages_error);
    context.insert("flag_count", &flags.flagged_messages.len());

    let summary = panel(summary, &SUMMARY, "summary", correlation_id, &mut context)
        .map(|report| report.summary)
        .unwrap_or_else(|| SUMMARY_FALLBACK.to_string());
    context.insert("summary", &summary);

    let sentiment = panel(sentiment, &SENTIMENT, "sentiment", correlation_id, &mut context)
        .and_then(|report| report.sentiment);
    context.insert("sentiment", &sentiment);

    let action_items =
        panel(action_items, &ACTION_ITEMS, "action_items", correlation_id, &mut context)
            .map(|report| report.action_items)
            .unwrap_or_default();
    context.insert("action_items", &action_items);

    context.insert("prompts", &prompt_views(&prompts));
    context.insert("correlation_id", correlation_id);

    let html = state.templates.render(TEMPLATE_NAME, &context).map_err(|error| {
        error!(
            event_name = "dashboard.render.failed",
            correlation_id,
            error = ?error,
            "dashboard template failed to render"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Template Error</h1>".to_string()))
    })?;

    Ok(Html(html))
}

/// Unwraps one analysis, recording `<name>_error` in the context on failure.
fn panel<T: AnalysisTask>(
    result: Result<T::Output, AnalysisError>,
    task: &T,
    name: &str,
    correlation_id: &str,
    context: &mut Context,
) -> Option<T::Output> {
    let error_key = format!("{name}_error");
    match result {
        Ok(output) => {
            context.insert(error_key, &Option::<String>::None);
            Some(output)
        }
        Err(source) => {
            warn!(
                event_name = "dashboard.panel.failed",
                correlation_id,
                panel = name,
                error = %source,
                "dashboard panel failed"
            );
            let interface = ApplicationError::from(source)
                .into_interface(task.failure_message(), correlation_id);
            context.insert(error_key, interface.public_message());
            None
        }
    }
}

fn message_views(
    messages: Vec<ChatMessage>,
    flags: &MiscommunicationReport,
) -> Vec<MessageView> {
    messages
        .into_iter()
        .map(|message| MessageView {
            flag_reason: flags.reason_for(&message.ts).map(str::to_string),
            text: message.text,
            user: message.user,
            ts: message.ts,
            channel: message.channel,
        })
        .collect()
}

fn prompt_views(prompts: &PromptSet) -> Vec<PromptView> {
    prompts
        .templates()
        .map(|template| PromptView {
            key: template.key.as_str(),
            field: query_field(template.key),
            label: label(template.key),
            text: template.text.clone(),
            default_text: template.key.default_text(),
        })
        .collect()
}

fn query_field(key: PromptKey) -> &'static str {
    match key {
        PromptKey::Summary => "summary_prompt",
        PromptKey::Sentiment => "sentiment_prompt",
        PromptKey::ActionItems => "action_items_prompt",
        PromptKey::Miscommunications => "miscommunications_prompt",
    }
}

fn label(key: PromptKey) -> &'static str {
    match key {
        PromptKey::Summary => "Summary",
        PromptKey::Sentiment => "Sentiment",
        PromptKey::ActionItems => "Action items",
        PromptKey::Miscommunications => "Miscommunications",
    }
}
