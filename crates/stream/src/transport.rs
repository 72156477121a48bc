use async_trait::async_trait;
use dingbridge_core::BridgeError;
use serde_json::Value;
use thiserror::Error;

use crate::message::{InboundEvent, StreamCredential};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("stream failed to connect: {0}")]
    Connect(String),
    #[error("stream read failed: {0}")]
    Receive(String),
    #[error("stream ack failed: {0}")]
    Acknowledge(String),
    #[error("access token lookup failed: {0}")]
    Token(String),
    #[error("stream disconnect failed: {0}")]
    Disconnect(String),
}

impl From<TransportError> for BridgeError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Contract for the long-lived push connection from the messaging platform.
///
/// A production implementation wraps a stream-mode client; this crate treats
/// it as a trusted, opaque collaborator and only consumes the contract below.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn connect(&self, credential: &StreamCredential) -> Result<(), TransportError>;

    /// Next inbound event, or `None` when the stream closed cleanly.
    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError>;

    /// Socket-level callback response confirming receipt of one message.
    async fn acknowledge(&self, message_id: &str, body: &Value) -> Result<(), TransportError>;

    /// Fresh access token for downstream authenticated calls. Refresh and
    /// caching are the transport's concern.
    async fn access_token(&self) -> Result<String, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Inert transport used when no credentials are configured and in tests.
#[derive(Default)]
pub struct NoopStreamTransport;

#[async_trait]
impl StreamTransport for NoopStreamTransport {
    async fn connect(&self, _credential: &StreamCredential) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _message_id: &str, _body: &Value) -> Result<(), TransportError> {
        Ok(())
    }

    async fn access_token(&self) -> Result<String, TransportError> {
        Ok(String::new())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
