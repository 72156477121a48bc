use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dingbridge_core::config::{RobotProfile, WebhookConfig};
use dingbridge_core::BridgeError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::message::{build_document, OutboundMessage};
use crate::sign::signed_url;

/// Header carrying the company-robot access token. Sent on every request,
/// empty for custom robots.
pub const ACCESS_TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("webhook configuration invalid: {0}")]
    Configuration(String),
    #[error("webhook payload invalid: {0}")]
    Payload(String),
    #[error("webhook request failed: {0}")]
    Transport(String),
}

impl From<SendError> for BridgeError {
    fn from(error: SendError) -> Self {
        match error {
            SendError::Configuration(detail) => Self::Configuration(detail),
            SendError::Payload(detail) => Self::Payload(detail),
            SendError::Transport(detail) => Self::Transport(detail),
        }
    }
}

/// Robot authentication mode. The signing secret and the access token are
/// mutually exclusive by construction: a target carries exactly one.
#[derive(Clone, Debug)]
pub enum RobotKind {
    Custom { secret: SecretString },
    Company { access_token: SecretString },
}

#[derive(Clone, Debug)]
pub struct WebhookTarget {
    pub base_url: String,
    pub robot: RobotKind,
}

impl WebhookTarget {
    pub fn custom(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), robot: RobotKind::Custom { secret: secret.into().into() } }
    }

    pub fn company(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            robot: RobotKind::Company { access_token: access_token.into().into() },
        }
    }

    /// Resolves a target from the validated webhook section of the app
    /// config.
    pub fn from_config(config: &WebhookConfig) -> Result<Self, SendError> {
        if !config.enabled {
            return Err(SendError::Configuration("webhook is not enabled".to_owned()));
        }
        let robot = match config.robot {
            RobotProfile::Custom => {
                let secret = config.secret.clone().ok_or_else(|| {
                    SendError::Configuration("custom robot has no signing secret".to_owned())
                })?;
                RobotKind::Custom { secret }
            }
            RobotProfile::Company => {
                let access_token = config.access_token.clone().ok_or_else(|| {
                    SendError::Configuration("company robot has no access token".to_owned())
                })?;
                RobotKind::Company { access_token }
            }
        };
        Ok(Self { base_url: config.base_url.clone(), robot })
    }
}

/// HTTP seam for the reply sender, so the send path is testable without a
/// network.
#[async_trait]
pub trait WebhookPoster: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        access_token: &str,
        body: &Value,
    ) -> Result<Value, SendError>;
}

/// Production poster backed by `reqwest`.
pub struct HttpWebhookPoster {
    client: reqwest::Client,
}

impl HttpWebhookPoster {
    pub fn new(timeout: Duration) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SendError::Configuration(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookPoster for HttpWebhookPoster {
    async fn post_json(
        &self,
        url: &str,
        access_token: &str,
        body: &Value,
    ) -> Result<Value, SendError> {
        let response = self
            .client
            .post(url)
            .header(ACCESS_TOKEN_HEADER, access_token)
            .json(body)
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        response.json().await.map_err(|error| SendError::Payload(error.to_string()))
    }
}

/// Stateless reply sender: builds the document, signs the URL for custom
/// robots, posts once, and returns the platform's JSON response verbatim.
/// Safe to invoke concurrently for independent targets; no ordering
/// guarantee exists between concurrent sends.
pub struct ReplySender {
    poster: Arc<dyn WebhookPoster>,
}

impl ReplySender {
    pub fn new(poster: Arc<dyn WebhookPoster>) -> Self {
        Self { poster }
    }

    pub async fn send(
        &self,
        target: &WebhookTarget,
        message: &OutboundMessage,
    ) -> Result<Value, SendError> {
        // Any configuration failure must surface before a network call.
        let document =
            build_document(message).map_err(|error| SendError::Configuration(error.to_string()))?;

        // Signed right before the post; the platform rejects stale timestamps.
        let (url, access_token) = match &target.robot {
            RobotKind::Custom { secret } => {
                let timestamp_ms = Utc::now().timestamp_millis();
                let url = signed_url(&target.base_url, secret.expose_secret(), timestamp_ms)
                    .map_err(|error| SendError::Configuration(error.to_string()))?;
                (url, String::new())
            }
            RobotKind::Company { access_token } => {
                (target.base_url.clone(), access_token.expose_secret().to_owned())
            }
        };

        debug!(
            event_name = "egress.webhook.posting",
            msgtype = document.get("msgtype").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "posting reply document"
        );

        let response = self.poster.post_json(&url, &access_token, &document).await?;

        info!(
            event_name = "egress.webhook.sent",
            msgtype = document.get("msgtype").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "reply posted"
        );

        Ok(response)
    }
}
