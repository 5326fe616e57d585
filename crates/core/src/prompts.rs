//! Prompt templates for the four analyses.
//!
//! A template is only the instruction text. The serialized conversation is
//! appended at render time in the style the analysis needs. Overrides come from
//! the dashboard (kept in the browser) and live for a single request inside a
//! [`PromptSet`]; nothing here is persisted server-side.

use serde::{Deserialize, Serialize};

use crate::domain::message::ChatMessage;

pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the following Slack conversation:";

pub const DEFAULT_SENTIMENT_PROMPT: &str = r#"You are a communication analyst AI. Analyze the overall sentiment of the following conversation.

Provide a response as a valid JSON object with two keys:
1.  "score": A numerical score from 1 (very negative) to 10 (very positive).
2.  "summary": A brief, one-sentence explanation for your score.

Do not include any introductory text. Your entire response must be only the JSON object.

Conversation to analyze:"#;

pub const DEFAULT_ACTION_ITEMS_PROMPT: &str = r#"You are an expert project manager's assistant. Analyze the conversation and extract action items.

Respond with a valid JSON object containing a single key "actionItems", which holds an array of objects.
Each object must have two keys:
1.  "task": A string describing the concise, actionable task.
2.  "suggestedOwner": A string with the name of the user who is likely responsible, based on context or being directly mentioned. If no owner can be identified, this should be null.

Example response:
{
  "actionItems": [
    { "task": "Prepare the slide deck for the client meeting", "suggestedOwner": "Bob" },
    { "task": "Finalize the Q3 budget report", "suggestedOwner": "Alice" }
  ]
}

Conversation to analyze:"#;

pub const DEFAULT_MISCOMMUNICATIONS_PROMPT: &str = r#"You are an expert communication analyst AI. Your task is to review a Slack conversation and identify messages that represent potential miscommunications or ambiguities.

Look for the following patterns:
- Unanswered questions.
- Vague or non-committal language (e.g., "maybe," "I'll try," "soon").
- Potentially conflicting information or deadlines.
- Assumptions that haven't been confirmed.
- Unclear requests or action items.

For each message you identify, provide its unique timestamp ('ts') and a brief, one-sentence reason for flagging it.

Respond with a valid JSON object containing a single key "flaggedMessages", which holds an array of objects. Each object must have a "ts" and a "reason". If you find no potential miscommunications, return an empty array.

Example Response:
{
  "flaggedMessages": [
    { "ts": "1722527938.123456", "reason": "The term 'soon' is ambiguous and could lead to mismatched expectations about the deadline." },
    { "ts": "1722527945.789012", "reason": "This direct question to Bob was not answered in the subsequent messages." }
  ]
}

Conversation to analyze:"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptKey {
    Summary,
    ActionItems,
    Sentiment,
    Miscommunications,
}

impl PromptKey {
    pub const ALL: [PromptKey; 4] =
        [Self::Summary, Self::Sentiment, Self::ActionItems, Self::Miscommunications];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::ActionItems => "actionItems",
            Self::Sentiment => "sentiment",
            Self::Miscommunications => "miscommunications",
        }
    }

    pub fn default_text(&self) -> &'static str {
        match self {
            Self::Summary => DEFAULT_SUMMARY_PROMPT,
            Self::ActionItems => DEFAULT_ACTION_ITEMS_PROMPT,
            Self::Sentiment => DEFAULT_SENTIMENT_PROMPT,
            Self::Miscommunications => DEFAULT_MISCOMMUNICATIONS_PROMPT,
        }
    }

    pub fn transcript_style(&self) -> TranscriptStyle {
        match self {
            Self::Summary => TranscriptStyle::Bulleted,
            Self::ActionItems => TranscriptStyle::Attributed,
            Self::Sentiment => TranscriptStyle::TextOnly,
            Self::Miscommunications => TranscriptStyle::Timestamped,
        }
    }
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How each message is written into the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptStyle {
    /// `- user: text`
    Bulleted,
    /// `user: text`
    Attributed,
    /// `text`
    TextOnly,
    /// `[ts: 1722527938.123456] user: text`
    Timestamped,
}

impl TranscriptStyle {
    pub fn render_line(&self, message: &ChatMessage) -> String {
        match self {
            Self::Bulleted => format!("- {}: {}", message.user, message.text),
            Self::Attributed => format!("{}: {}", message.user, message.text),
            Self::TextOnly => message.text.clone(),
            Self::Timestamped => {
                format!("[ts: {}] {}: {}", message.ts, message.user, message.text)
            }
        }
    }

    pub fn render(&self, messages: &[ChatMessage]) -> String {
        messages.iter().map(|message| self.render_line(message)).collect::<Vec<_>>().join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub key: PromptKey,
    pub text: String,
}

impl PromptTemplate {
    pub fn default_for(key: PromptKey) -> Self {
        Self { key, text: key.default_text().to_string() }
    }

    pub fn is_default(&self) -> bool {
        self.text == self.key.default_text()
    }

    /// Instruction text, a blank line, then the conversation.
    pub fn render(&self, messages: &[ChatMessage]) -> String {
        let transcript = self.key.transcript_style().render(messages);
        format!("{}\n\n{}\n", self.text.trim_end(), transcript)
    }
}

/// The four templates in effect for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    summary: PromptTemplate,
    action_items: PromptTemplate,
    sentiment: PromptTemplate,
    miscommunications: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            summary: PromptTemplate::default_for(PromptKey::Summary),
            action_items: PromptTemplate::default_for(PromptKey::ActionItems),
            sentiment: PromptTemplate::default_for(PromptKey::Sentiment),
            miscommunications: PromptTemplate::default_for(PromptKey::Miscommunications),
        }
    }
}

impl PromptSet {
    pub fn get(&self, key: PromptKey) -> &PromptTemplate {
        match key {
            PromptKey::Summary => &self.summary,
            PromptKey::ActionItems => &self.action_items,
            PromptKey::Sentiment => &self.sentiment,
            PromptKey::Miscommunications => &self.miscommunications,
        }
    }

    /// Blank overrides leave the default in place.
    pub fn with_override(mut self, key: PromptKey, text: Option<&str>) -> Self {
        let Some(text) = text.filter(|value| !value.trim().is_empty()) else {
            return self;
        };

        let slot = match key {
            PromptKey::Summary => &mut self.summary,
            PromptKey::ActionItems => &mut self.action_items,
            PromptKey::Sentiment => &mut self.sentiment,
            PromptKey::Miscommunications => &mut self.miscommunications,
        };
        slot.text = text.to_string();
        self
    }

    pub fn templates(&self) -> impl Iterator<Item = &PromptTemplate> {
        PromptKey::ALL.into_iter().map(|key| self.get(key))
    }
}
