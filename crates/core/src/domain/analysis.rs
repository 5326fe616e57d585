//! Derived analysis results.
//!
//! These are never persisted. Field names follow the JSON the dashboard
//! consumes, which is also the shape the model is asked to produce.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

pub const SUMMARY_FALLBACK: &str = "No summary available.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summary: String,
}

impl SummaryReport {
    pub fn unavailable() -> Self {
        Self { summary: SUMMARY_FALLBACK.to_string() }
    }
}

/// Sentiment score is 1 (very negative) to 10 (very positive). The range is
/// what the model is asked for; it is not enforced on the way back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: i64,
    pub summary: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub sentiment: Option<Sentiment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub task: String,
    #[serde(rename = "suggestedOwner", default)]
    pub suggested_owner: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItemsReport {
    #[serde(rename = "actionItems")]
    pub action_items: Vec<ActionItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedMessage {
    pub ts: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscommunicationReport {
    #[serde(rename = "flaggedMessages")]
    pub flagged_messages: Vec<FlaggedMessage>,
}

impl MiscommunicationReport {
    pub fn reason_for(&self, ts: &str) -> Option<&str> {
        self.flagged_messages.iter().find(|flag| flag.ts == ts).map(|flag| flag.reason.as_str())
    }

    /// Flags whose `ts` does not belong to the analysed window.
    pub fn unknown_references<'a>(&'a self, window: &[ChatMessage]) -> Vec<&'a FlaggedMessage> {
        let known: HashSet<&str> = window.iter().map(|message| message.ts.as_str()).collect();
        self.flagged_messages.iter().filter(|flag| !known.contains(flag.ts.as_str())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_item_owner_may_be_null_or_missing() {
        let parsed: ActionItemsReport = serde_json::from_str(
            r#"{"actionItems":[
                {"task":"Prepare the slide deck","suggestedOwner":"Bob"},
                {"task":"Book a room","suggestedOwner":null},
                {"task":"Send notes"}
            ]}"#,
        )
        .expect("parse action items");

        assert_eq!(parsed.action_items.len(), 3);
        assert_eq!(parsed.action_items[0].suggested_owner.as_deref(), Some("Bob"));
        assert_eq!(parsed.action_items[1].suggested_owner, None);
        assert_eq!(parsed.action_items[2].suggested_owner, None);

        let value = serde_json::to_value(&parsed.action_items[1]).expect("serialize");
        assert!(value["suggestedOwner"].is_null());
    }

    #[test]
    fn empty_sentiment_serializes_as_null() {
        let value = serde_json::to_value(SentimentReport::default()).expect("serialize");
        assert_eq!(value, serde_json::json!({ "sentiment": null }));
    }

    #[test]
    fn unknown_references_lists_flags_outside_window() {
        let report = MiscommunicationReport {
            flagged_messages: vec![
                FlaggedMessage { ts: "2".to_string(), reason: "Vague commitment".to_string() },
                FlaggedMessage { ts: "99".to_string(), reason: "Invented".to_string() },
            ],
        };
        let window = vec![
            ChatMessage::new("ship by Friday", "A", "1", "C1"),
            ChatMessage::new("maybe", "B", "2", "C1"),
        ];

        let unknown = report.unknown_references(&window);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].ts, "99");
        assert_eq!(report.reason_for("2"), Some("Vague commitment"));
    }
}
