use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use huddle_core::domain::message::ChatMessage;
use huddle_db::repositories::{MessageRepository, RepositoryError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq)]
pub enum SlackEvent {
    /// Handshake sent when the request URL is configured. The challenge is
    /// kept as raw JSON so it can be echoed back unchanged.
    UrlVerification { challenge: Value },
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::UrlVerification { .. } => SlackEventType::UrlVerification,
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    UrlVerification,
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub ts: String,
    pub user: String,
    pub text: String,
}

impl From<MessageEvent> for ChatMessage {
    fn from(event: MessageEvent) -> Self {
        ChatMessage { text: event.text, user: event.user, ts: event.ts, channel: event.channel }
    }
}

/// Classifies a raw Events API body. Never fails: shapes it does not
/// understand become [`SlackEvent::Unsupported`].
pub fn parse_payload(body: &Value) -> SlackEvent {
    let payload_type = body.get("type").and_then(Value::as_str).unwrap_or_default();
    if payload_type == "url_verification" {
        return SlackEvent::UrlVerification {
            challenge: body.get("challenge").cloned().unwrap_or(Value::Null),
        };
    }

    let Some(event) = body.get("event") else {
        let event_type = if payload_type.is_empty() { "unknown" } else { payload_type };
        return SlackEvent::Unsupported { event_type: event_type.to_owned() };
    };

    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
    if event_type != "message" {
        return SlackEvent::Unsupported { event_type: event_type.to_owned() };
    }

    // Without `ts` and `channel` there is nothing to order or attribute.
    let (Some(ts), Some(channel)) = (string_field(event, "ts"), string_field(event, "channel"))
    else {
        return SlackEvent::Unsupported { event_type: "message.incomplete".to_owned() };
    };

    SlackEvent::Message(MessageEvent {
        channel,
        ts,
        user: string_field(event, "user").unwrap_or_default(),
        text: string_field(event, "text").unwrap_or_default(),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
    Challenge(Value),
    Stored,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("message store failure: {0}")]
    Store(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            debug!(
                event_name = "ingest.event.ignored",
                correlation_id = %ctx.correlation_id,
                event = ?event.event_type(),
                "no handler registered for inbound event"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }
}

pub fn default_dispatcher(store: Arc<dyn MessageRepository>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(UrlVerificationHandler);
    dispatcher.register(MessageEventHandler::new(store));
    dispatcher
}

pub struct UrlVerificationHandler;

#[async_trait]
impl EventHandler for UrlVerificationHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::UrlVerification
    }

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::UrlVerification { challenge } = event else {
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "ingest.url_verification",
            correlation_id = %ctx.correlation_id,
            "answering slack url verification handshake"
        );
        Ok(HandlerResult::Challenge(challenge.clone()))
    }
}

pub struct MessageEventHandler {
    store: Arc<dyn MessageRepository>,
}

impl MessageEventHandler {
    pub fn new(store: Arc<dyn MessageRepository>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for MessageEventHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(message) = event else {
            return Ok(HandlerResult::Ignored);
        };

        self.store.append(ChatMessage::from(message.clone())).await?;
        info!(
            event_name = "ingest.message.stored",
            correlation_id = %ctx.correlation_id,
            channel = %message.channel,
            ts = %message.ts,
            "slack message stored"
        );
        Ok(HandlerResult::Stored)
    }
}
