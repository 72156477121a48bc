use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use dingbridge_core::config::TOPIC_ROBOT;
use dingbridge_core::BridgeError;

use crate::message::{InboundEvent, InboundRecord, RobotMessage, StreamCredential};
use crate::transport::{StreamTransport, TransportError};

/// Per-event failure that must not terminate the stream connection. Reported
/// to the consumer, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("event on topic `{topic}` is missing the messageId header")]
    MissingMessageId { topic: String },
    #[error("robot message `{message_id}` is not valid JSON: {detail}")]
    Malformed { message_id: String, detail: String },
}

impl From<PayloadError> for BridgeError {
    fn from(error: PayloadError) -> Self {
        Self::Payload(error.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("robot message handler failure: {0}")]
    Failure(String),
}

/// Consumer side of the listener. `on_message` runs one event at a time; a
/// long-running body delays delivery of later events but not the ack of the
/// current one.
#[async_trait]
pub trait RobotMessageHandler: Send + Sync {
    async fn on_message(&self, record: InboundRecord) -> Result<(), HandlerError>;

    /// Per-event payload failures land here after being logged. The default
    /// implementation drops them.
    async fn on_payload_error(&self, _error: &PayloadError) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug)]
pub struct ListenerOptions {
    pub topic: String,
    pub auto_ack: bool,
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            topic: TOPIC_ROBOT.to_owned(),
            auto_ack: true,
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

/// Owns one logical stream connection and pumps robot events to a handler.
///
/// Per event on the configured topic: extract the message id, acknowledge
/// (when auto-ack is on) before any consumer work so the platform does not
/// redeliver behind a slow handler, parse the payload, resolve a fresh access
/// token, and forward the normalized record.
pub struct RobotListener {
    transport: Arc<dyn StreamTransport>,
    handler: Arc<dyn RobotMessageHandler>,
    credential: StreamCredential,
    topic: String,
    auto_ack: bool,
    reconnect_policy: ReconnectPolicy,
    closed: AtomicBool,
}

impl RobotListener {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        handler: Arc<dyn RobotMessageHandler>,
        credential: StreamCredential,
        options: ListenerOptions,
    ) -> Self {
        Self {
            transport,
            handler,
            credential,
            topic: options.topic,
            auto_ack: options.auto_ack,
            reconnect_policy: options.reconnect_policy,
            closed: AtomicBool::new(false),
        }
    }

    /// Runs the connection until the stream closes or retries are exhausted.
    /// Exhaustion degrades gracefully rather than crashing the process.
    pub async fn run(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }

            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "stream transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "stream retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Closes the transport. Idempotent: a second call is a no-op and sends
    /// no second close signal, and calling it before a successful connect is
    /// safe.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.disconnect().await
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, client_id = %self.credential.client_id, "opening stream connection");
        self.transport.connect(&self.credential).await?;
        info!(attempt, topic = %self.topic, "stream connected");

        loop {
            let Some(event) = self.transport.next_event().await? else {
                info!(attempt, "stream closed by peer");
                self.disconnect().await?;
                return Ok(());
            };

            if event.topic != self.topic {
                debug!(topic = %event.topic, "ignoring event on unregistered topic");
                continue;
            }

            self.process_event(event).await;
        }
    }

    async fn process_event(&self, event: InboundEvent) {
        let Some(message_id) = event.message_id().map(str::to_owned) else {
            let error = PayloadError::MissingMessageId { topic: event.topic.clone() };
            warn!(
                event_name = "ingress.stream.payload_error",
                error_class = BridgeError::from(error.clone()).class(),
                topic = %event.topic,
                error = %error,
                "dropping event without a message id"
            );
            self.handler.on_payload_error(&error).await;
            return;
        };

        if self.auto_ack {
            // Timely ack marks the event delivered; late or absent ack makes
            // the platform redeliver it.
            if let Err(error) = self.transport.acknowledge(&message_id, &json!({})).await {
                warn!(
                    event_name = "ingress.stream.ack_failed",
                    message_id = %message_id,
                    error = %error,
                    "failed to acknowledge robot message"
                );
            } else {
                debug!(
                    event_name = "ingress.stream.ack_sent",
                    message_id = %message_id,
                    "acknowledged robot message"
                );
            }
        }

        let message = match RobotMessage::parse(&event.raw_payload) {
            Ok(message) => message,
            Err(parse_error) => {
                let error = PayloadError::Malformed {
                    message_id: message_id.clone(),
                    detail: parse_error.to_string(),
                };
                warn!(
                    event_name = "ingress.stream.payload_error",
                    error_class = BridgeError::from(error.clone()).class(),
                    message_id = %message_id,
                    error = %error,
                    "robot message payload did not parse"
                );
                self.handler.on_payload_error(&error).await;
                return;
            }
        };

        let access_token = match self.transport.access_token().await {
            Ok(access_token) => access_token,
            Err(error) => {
                warn!(
                    event_name = "ingress.stream.token_failed",
                    message_id = %message_id,
                    error = %error,
                    "access token lookup failed; dropping event"
                );
                return;
            }
        };

        info!(
            event_name = "ingress.stream.message_received",
            message_id = %message_id,
            msgtype = message.msgtype.as_deref().unwrap_or("unknown"),
            "forwarding robot message to handler"
        );

        let record = InboundRecord { access_token, message_id: message_id.clone(), message };
        if let Err(error) = self.handler.on_message(record).await {
            warn!(
                message_id = %message_id,
                error = %error,
                "robot message handler failed; continuing stream loop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use super::{
        HandlerError, ListenerOptions, PayloadError, ReconnectPolicy, RobotListener,
        RobotMessageHandler,
    };
    use crate::message::{InboundEvent, InboundRecord, StreamCredential, HEADER_MESSAGE_ID};
    use crate::transport::{StreamTransport, TransportError};

    fn robot_event(message_id: Option<&str>, payload: &str) -> InboundEvent {
        let mut headers = HashMap::new();
        if let Some(message_id) = message_id {
            headers.insert(HEADER_MESSAGE_ID.to_owned(), message_id.to_owned());
        }
        InboundEvent {
            topic: super::TOPIC_ROBOT.to_owned(),
            headers,
            raw_payload: payload.to_owned(),
        }
    }

    fn credential() -> StreamCredential {
        StreamCredential::new("app-1", "secret-1")
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        events: VecDeque<Result<Option<InboundEvent>, TransportError>>,
        token_results: VecDeque<Result<String, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_events(events: Vec<Result<Option<InboundEvent>, TransportError>>) -> Self {
            Self {
                state: Mutex::new(ScriptedState { events: events.into(), ..Default::default() }),
                trace: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            events: Vec<Result<Option<InboundEvent>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    events: events.into(),
                    ..Default::default()
                }),
                trace: Arc::new(Mutex::new(Vec::new())),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn connect(&self, _credential: &StreamCredential) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_event(&self) -> Result<Option<InboundEvent>, TransportError> {
            let mut state = self.state.lock().await;
            state.events.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, message_id: &str, body: &Value) -> Result<(), TransportError> {
            assert_eq!(body, &serde_json::json!({}), "ack body must be empty");
            let mut state = self.state.lock().await;
            state.acknowledgements.push(message_id.to_owned());
            self.trace.lock().await.push(format!("ack:{message_id}"));
            Ok(())
        }

        async fn access_token(&self) -> Result<String, TransportError> {
            let mut state = self.state.lock().await;
            state.token_results.pop_front().unwrap_or_else(|| Ok("token-fresh".to_owned()))
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        records: Mutex<Vec<InboundRecord>>,
        payload_errors: Mutex<Vec<PayloadError>>,
        trace: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingHandler {
        fn sharing_trace(trace: Arc<Mutex<Vec<String>>>) -> Self {
            Self { trace, ..Default::default() }
        }

        async fn records(&self) -> Vec<InboundRecord> {
            self.records.lock().await.clone()
        }

        async fn payload_errors(&self) -> Vec<PayloadError> {
            self.payload_errors.lock().await.clone()
        }
    }

    #[async_trait]
    impl RobotMessageHandler for RecordingHandler {
        async fn on_message(&self, record: InboundRecord) -> Result<(), HandlerError> {
            self.trace.lock().await.push(format!("handle:{}", record.message_id));
            self.records.lock().await.push(record);
            Ok(())
        }

        async fn on_payload_error(&self, error: &PayloadError) {
            self.payload_errors.lock().await.push(error.clone());
        }
    }

    fn listener(
        transport: Arc<ScriptedTransport>,
        handler: Arc<RecordingHandler>,
        auto_ack: bool,
    ) -> RobotListener {
        RobotListener::new(
            transport,
            handler,
            credential(),
            ListenerOptions {
                auto_ack,
                reconnect_policy: ReconnectPolicy { max_retries: 1, base_delay_ms: 0, max_delay_ms: 0 },
                ..ListenerOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn acknowledges_before_forwarding_to_handler() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(Some("m1"), r#"{"msgtype":"text","text":{"content":"hi"}}"#))),
            Ok(None),
        ]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        let trace = transport.trace.lock().await.clone();
        assert_eq!(trace, vec!["ack:m1", "handle:m1"]);
        assert_eq!(transport.acknowledgements().await, vec!["m1"]);
    }

    #[tokio::test]
    async fn forwards_access_token_and_parsed_message() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(Some("m2"), r#"{"msgtype":"text","text":{"content":"ping"}}"#))),
            Ok(None),
        ]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        let records = handler.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].access_token, "token-fresh");
        assert_eq!(records[0].message_id, "m2");
        assert_eq!(records[0].message.text_content(), Some("ping"));
    }

    #[tokio::test]
    async fn auto_ack_disabled_sends_no_acknowledgements() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(Some("m3"), r#"{"msgtype":"text"}"#))),
            Ok(None),
        ]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), false).run().await.expect("run");

        assert!(transport.acknowledgements().await.is_empty());
        assert_eq!(handler.records().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_does_not_terminate_the_connection() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(Some("bad"), "{{ not json"))),
            Ok(Some(robot_event(Some("good"), r#"{"msgtype":"text"}"#))),
            Ok(None),
        ]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        let errors = handler.payload_errors().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PayloadError::Malformed { ref message_id, .. } if message_id == "bad"));

        let records = handler.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "good");
        // Both events were acknowledged, including the malformed one, so the
        // platform does not redeliver a poison payload.
        assert_eq!(transport.acknowledgements().await, vec!["bad", "good"]);
    }

    #[tokio::test]
    async fn event_without_message_id_is_reported_and_skipped() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(None, r#"{"msgtype":"text"}"#))),
            Ok(None),
        ]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        assert!(transport.acknowledgements().await.is_empty());
        assert!(handler.records().await.is_empty());
        assert!(matches!(
            handler.payload_errors().await.as_slice(),
            [PayloadError::MissingMessageId { .. }]
        ));
    }

    #[tokio::test]
    async fn events_on_other_topics_are_ignored() {
        let mut off_topic = robot_event(Some("m4"), r#"{"msgtype":"text"}"#);
        off_topic.topic = "/v1.0/card/instances/callback".to_owned();
        let transport =
            Arc::new(ScriptedTransport::with_events(vec![Ok(Some(off_topic)), Ok(None)]));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        assert!(handler.records().await.is_empty());
        assert!(transport.acknowledgements().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::default());
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));
        let listener = listener(transport.clone(), handler, true);

        listener.disconnect().await.expect("first disconnect");
        listener.disconnect().await.expect("second disconnect");

        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_safe() {
        let transport = Arc::new(ScriptedTransport::default());
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));
        let listener = listener(transport.clone(), handler, true);

        listener.disconnect().await.expect("teardown without connect");
        listener.run().await.expect("run after disconnect is a no-op");

        assert_eq!(transport.connect_attempts().await, 0);
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(robot_event(Some("m5"), r#"{"msgtype":"text"}"#))),
                Ok(None),
            ],
        ));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["m5"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
            ],
            vec![],
        ));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler, true).run().await.expect("degrades gracefully");

        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn token_failure_drops_the_event_but_keeps_the_connection() {
        let transport = Arc::new(ScriptedTransport::with_events(vec![
            Ok(Some(robot_event(Some("m6"), r#"{"msgtype":"text"}"#))),
            Ok(Some(robot_event(Some("m7"), r#"{"msgtype":"text"}"#))),
            Ok(None),
        ]));
        transport
            .state
            .lock()
            .await
            .token_results
            .push_back(Err(TransportError::Token("expired".to_owned())));
        let handler = Arc::new(RecordingHandler::sharing_trace(transport.trace.clone()));

        listener(transport.clone(), handler.clone(), true).run().await.expect("run");

        let records = handler.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, "m7");
    }

    #[test]
    fn backoff_is_bounded_by_max_delay() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(8).as_millis(), 1_000);
        assert_eq!(policy.backoff(64).as_millis(), 1_000);
    }
}
