//! One parameterized analysis flow.
//!
//! Every analysis reads the newest window of messages, renders a prompt, calls
//! the generative-text service once and parses the answer. What differs per
//! analysis is carried by an [`AnalysisTask`] record: prompt key, response
//! format, output shape, the neutral value for an empty answer and whether
//! failures propagate or fall back.

use std::sync::Arc;
use std::time::Instant;

use huddle_core::domain::analysis::{
    ActionItemsReport, MiscommunicationReport, Sentiment, SentimentReport, SummaryReport,
};
use huddle_core::domain::message::{ChatMessage, SortOrder};
use huddle_core::errors::ApplicationError;
use huddle_core::prompts::{PromptKey, PromptTemplate};
use huddle_db::{MessageRepository, RepositoryError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{CompletionRequest, LlmClient, LlmError, ResponseFormat};

pub const DEFAULT_WINDOW_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("could not read message window: {0}")]
    StoreRead(#[from] RepositoryError),
    #[error("message window is empty")]
    EmptyWindow,
    #[error(transparent)]
    Upstream(#[from] LlmError),
    #[error("malformed {key} response: {source}")]
    MalformedUpstreamResponse {
        key: PromptKey,
        #[source]
        source: serde_json::Error,
    },
}

impl From<AnalysisError> for ApplicationError {
    fn from(error: AnalysisError) -> Self {
        match error {
            AnalysisError::StoreRead(_) | AnalysisError::EmptyWindow => {
                ApplicationError::DataUnavailable(error.to_string())
            }
            AnalysisError::Upstream(_) => ApplicationError::Upstream(error.to_string()),
            AnalysisError::MalformedUpstreamResponse { .. } => {
                ApplicationError::MalformedUpstreamResponse(error.to_string())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Upstream and parse failures reach the caller.
    Propagate,
    /// Upstream and parse failures are replaced by [`AnalysisTask::fallback`].
    Fallback,
}

/// Configuration record for one analysis.
pub trait AnalysisTask: Send + Sync {
    type Output: Serialize + Send;

    fn key(&self) -> PromptKey;

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Json
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    /// Public error text for upstream and parse failures.
    fn failure_message(&self) -> &'static str;

    /// Result when the model answers with no text.
    fn empty(&self) -> Self::Output;

    /// Result used in place of a failure under [`FailurePolicy::Fallback`].
    fn fallback(&self) -> Self::Output {
        self.empty()
    }

    fn parse(&self, text: &str) -> Result<Self::Output, serde_json::Error>;

    /// Post-parse check against the analysed window. Never rejects.
    fn inspect(&self, _output: &Self::Output, _window: &[ChatMessage], _correlation_id: &str) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SummaryTask;

#[derive(Clone, Copy, Debug, Default)]
pub struct SentimentTask;

#[derive(Clone, Copy, Debug, Default)]
pub struct ActionItemsTask;

#[derive(Clone, Copy, Debug, Default)]
pub struct MiscommunicationsTask;

pub const SUMMARY: SummaryTask = SummaryTask;
pub const SENTIMENT: SentimentTask = SentimentTask;
pub const ACTION_ITEMS: ActionItemsTask = ActionItemsTask;
pub const MISCOMMUNICATIONS: MiscommunicationsTask = MiscommunicationsTask;

impl AnalysisTask for SummaryTask {
    type Output = SummaryReport;

    fn key(&self) -> PromptKey {
        PromptKey::Summary
    }

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Text
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Fallback
    }

    fn failure_message(&self) -> &'static str {
        "Failed to generate summary"
    }

    fn empty(&self) -> SummaryReport {
        SummaryReport::unavailable()
    }

    fn parse(&self, text: &str) -> Result<SummaryReport, serde_json::Error> {
        Ok(SummaryReport { summary: text.trim().to_string() })
    }
}

impl AnalysisTask for SentimentTask {
    type Output = SentimentReport;

    fn key(&self) -> PromptKey {
        PromptKey::Sentiment
    }

    fn failure_message(&self) -> &'static str {
        "Failed to analyze sentiment"
    }

    fn empty(&self) -> SentimentReport {
        SentimentReport::default()
    }

    fn parse(&self, text: &str) -> Result<SentimentReport, serde_json::Error> {
        let sentiment: Sentiment = serde_json::from_str(strip_code_fence(text))?;
        Ok(SentimentReport { sentiment: Some(sentiment) })
    }
}

impl AnalysisTask for ActionItemsTask {
    type Output = ActionItemsReport;

    fn key(&self) -> PromptKey {
        PromptKey::ActionItems
    }

    fn failure_message(&self) -> &'static str {
        "Failed to generate action items"
    }

    fn empty(&self) -> ActionItemsReport {
        ActionItemsReport::default()
    }

    fn parse(&self, text: &str) -> Result<ActionItemsReport, serde_json::Error> {
        serde_json::from_str(strip_code_fence(text))
    }
}

impl AnalysisTask for MiscommunicationsTask {
    type Output = MiscommunicationReport;

    fn key(&self) -> PromptKey {
        PromptKey::Miscommunications
    }

    fn failure_message(&self) -> &'static str {
        "Failed to analyze messages"
    }

    fn empty(&self) -> MiscommunicationReport {
        MiscommunicationReport::default()
    }

    fn parse(&self, text: &str) -> Result<MiscommunicationReport, serde_json::Error> {
        serde_json::from_str(strip_code_fence(text))
    }

    fn inspect(
        &self,
        output: &MiscommunicationReport,
        window: &[ChatMessage],
        correlation_id: &str,
    ) {
        for flag in output.unknown_references(window) {
            warn!(
                event_name = "analysis.miscommunications.unknown_ts",
                correlation_id,
                ts = %flag.ts,
                "flagged message does not belong to the analysed window"
            );
        }
    }
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop the info string (`json`) on the opening line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

#[derive(Clone)]
pub struct AnalysisPipeline {
    store: Arc<dyn MessageRepository>,
    llm: Arc<dyn LlmClient>,
    window_size: u32,
}

impl AnalysisPipeline {
    pub fn new(store: Arc<dyn MessageRepository>, llm: Arc<dyn LlmClient>, window_size: u32) -> Self {
        Self { store, llm, window_size }
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Runs `task` with `template` as instruction text. The template's key is
    /// expected to match the task's.
    pub async fn run<T: AnalysisTask>(
        &self,
        task: &T,
        template: &PromptTemplate,
        correlation_id: &str,
    ) -> Result<T::Output, AnalysisError> {
        let started = Instant::now();
        let key = task.key();

        let window = self.store.recent(self.window_size, SortOrder::Ascending).await?;
        if window.is_empty() {
            return Err(AnalysisError::EmptyWindow);
        }

        let request = CompletionRequest {
            prompt: template.render(&window),
            response_format: task.response_format(),
        };

        let outcome = match self.llm.complete(&request).await {
            Ok(Some(text)) => task
                .parse(&text)
                .map_err(|source| AnalysisError::MalformedUpstreamResponse { key, source }),
            Ok(None) => {
                info!(
                    event_name = "analysis.upstream.empty",
                    correlation_id,
                    analysis = %key,
                    "model returned no text; using neutral result"
                );
                Ok(task.empty())
            }
            Err(error) => Err(AnalysisError::Upstream(error)),
        };

        let output = match (outcome, task.failure_policy()) {
            (Ok(output), _) => output,
            (Err(error), FailurePolicy::Fallback) => {
                warn!(
                    event_name = "analysis.fallback",
                    correlation_id,
                    analysis = %key,
                    error = %error,
                    "analysis failed; returning fallback"
                );
                task.fallback()
            }
            (Err(error), FailurePolicy::Propagate) => return Err(error),
        };

        task.inspect(&output, &window, correlation_id);

        info!(
            event_name = "analysis.completed",
            correlation_id,
            analysis = %key,
            provider = self.llm.provider_name(),
            window_len = window.len(),
            custom_prompt = !template.is_default(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis completed"
        );
        Ok(output)
    }
}
