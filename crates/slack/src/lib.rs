//! Slack Events API ingestion.
//!
//! Slack posts every subscribed event to a single request URL. This crate turns
//! that JSON body into a [`events::SlackEvent`] and routes it to a handler:
//!
//! ```text
//! POST body → parse_payload → EventDispatcher → UrlVerificationHandler → {challenge}
//!                                             → MessageEventHandler     → MessageRepository
//!                                             → (none)                  → ignored
//! ```
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Event Subscriptions and point the request URL at `POST /ingest`
//! 3. Subscribe to `message.channels` (and `message.groups` for private channels)
//!
//! Slack sends a `url_verification` handshake when the URL is saved; the
//! dispatcher echoes its challenge without touching the store.

pub mod events;
