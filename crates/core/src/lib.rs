pub mod config;
pub mod domain;
pub mod errors;
pub mod prompts;

pub use domain::analysis::{
    ActionItem, ActionItemsReport, FlaggedMessage, MiscommunicationReport, Sentiment,
    SentimentReport, SummaryReport,
};
pub use domain::message::{ChatMessage, SortOrder};
pub use errors::{ApplicationError, InterfaceError};
pub use prompts::{PromptKey, PromptSet, PromptTemplate, TranscriptStyle};
