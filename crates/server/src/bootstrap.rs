use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use dingbridge_core::config::AppConfig;
use dingbridge_stream::{
    ListenerOptions, NoopStreamTransport, ReconnectPolicy, RobotListener, RobotMessageHandler,
    StreamCredential, StreamTransport,
};
use dingbridge_webhook::{HttpWebhookPoster, ReplySender, SendError};

use crate::reply::{LoggingHandler, SessionReplyHandler};

pub struct Application {
    pub config: AppConfig,
    pub listener: Arc<RobotListener>,
    transport_mode: &'static str,
}

impl Application {
    pub fn transport_mode(&self) -> &'static str {
        self.transport_mode
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("webhook client construction failed: {0}")]
    Webhook(#[from] SendError),
}

/// Wires the listener from an already-loaded config. The production stream
/// transport is an external collaborator; embedders pass their own
/// implementation, and `None` falls back to the inert noop transport.
pub fn bootstrap_with_config(
    config: AppConfig,
    transport: Option<Arc<dyn StreamTransport>>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        topic = %config.stream.topic,
        "starting bridge bootstrap"
    );

    let handler: Arc<dyn RobotMessageHandler> = if config.webhook.enabled {
        let poster = HttpWebhookPoster::new(Duration::from_secs(config.webhook.timeout_secs))?;
        Arc::new(SessionReplyHandler::new(ReplySender::new(Arc::new(poster))))
    } else {
        Arc::new(LoggingHandler)
    };

    let (transport, transport_mode) = match transport {
        Some(transport) => (transport, "stream"),
        None => (Arc::new(NoopStreamTransport) as Arc<dyn StreamTransport>, "noop"),
    };

    let credential = StreamCredential::from_config(&config.stream);
    let listener = Arc::new(RobotListener::new(
        transport,
        handler,
        credential,
        ListenerOptions {
            topic: config.stream.topic.clone(),
            auto_ack: config.stream.auto_ack,
            reconnect_policy: ReconnectPolicy {
                max_retries: config.stream.max_retries,
                base_delay_ms: config.stream.base_delay_ms,
                max_delay_ms: config.stream.max_delay_ms,
            },
        },
    ));

    info!(
        event_name = "system.bootstrap.ready",
        transport_mode,
        webhook_enabled = config.webhook.enabled,
        "bridge bootstrap complete"
    );

    Ok(Application { config, listener, transport_mode })
}
