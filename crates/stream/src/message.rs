use std::collections::HashMap;

use dingbridge_core::config::StreamConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header key carrying the platform-assigned message id on every event.
pub const HEADER_MESSAGE_ID: &str = "messageId";

/// Application identity used to open the stream connection. Immutable for
/// the lifetime of a connection.
#[derive(Clone, Debug)]
pub struct StreamCredential {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl StreamCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into().into() }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self { client_id: config.client_id.clone(), client_secret: config.client_secret.clone() }
    }
}

/// A raw event as delivered by the stream transport, before any parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub topic: String,
    pub headers: HashMap<String, String>,
    pub raw_payload: String,
}

impl InboundEvent {
    /// The platform-assigned message id, extracted from the event headers.
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(HEADER_MESSAGE_ID).map(String::as_str)
    }
}

/// Parsed robot message. The platform defines the full shape; everything a
/// replier does not need to echo stays in `extra` untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RobotMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgtype: Option<String>,
    #[serde(default, rename = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, rename = "senderStaffId", skip_serializing_if = "Option::is_none")]
    pub sender_staff_id: Option<String>,
    #[serde(default, rename = "sessionWebhook", skip_serializing_if = "Option::is_none")]
    pub session_webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

impl RobotMessage {
    pub fn parse(raw_payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw_payload)
    }

    /// Trimmed text content, if the message carries any.
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_ref().map(|text| text.content.trim()).filter(|content| !content.is_empty())
    }
}

/// Normalized record forwarded to the consumer callback: the parsed message
/// plus a fresh access token so the consumer can make further authenticated
/// calls without re-deriving it.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundRecord {
    pub access_token: String,
    pub message_id: String,
    pub message: RobotMessage,
}
