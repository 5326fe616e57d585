//! Analysis runtime - turns a window of chat messages into structured insight
//!
//! This crate provides:
//! - **Generative-text clients** (`llm`) - Gemini and OpenAI-compatible HTTP adapters
//!   behind the `LlmClient` trait
//! - **Analysis pipeline** (`pipeline`) - one parameterized read → prompt → call →
//!   parse flow, configured per analysis by an `AnalysisTask` record
//!
//! # Architecture
//!
//! ```text
//! MessageRepository::recent → PromptTemplate::render → LlmClient::complete → AnalysisTask::parse
//! ```
//!
//! The four tasks (`SUMMARY`, `SENTIMENT`, `ACTION_ITEMS`, `MISCOMMUNICATIONS`)
//! differ only in prompt, response format, output shape and failure policy.
//!
//! # Trust
//!
//! Model output is parsed, never validated. Owners and timestamps the model
//! returns are not checked against the input window beyond a logged warning.

pub mod llm;
pub mod pipeline;
