use async_trait::async_trait;
use tracing::{debug, info};

use dingbridge_stream::{HandlerError, InboundRecord, RobotMessageHandler};
use dingbridge_webhook::{Mention, OutboundMessage, ReplySender, WebhookTarget};

/// Replies to each inbound text message through the session webhook the
/// message itself carries, authenticating with the per-event access token.
/// Messages without a session webhook or without text content are logged and
/// skipped.
pub struct SessionReplyHandler {
    sender: ReplySender,
}

impl SessionReplyHandler {
    pub fn new(sender: ReplySender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl RobotMessageHandler for SessionReplyHandler {
    async fn on_message(&self, record: InboundRecord) -> Result<(), HandlerError> {
        let Some(session_webhook) = record.message.session_webhook.as_deref() else {
            debug!(
                message_id = %record.message_id,
                "message carries no session webhook; nothing to reply to"
            );
            return Ok(());
        };
        let Some(content) = record.message.text_content() else {
            debug!(message_id = %record.message_id, "message has no text content; skipping reply");
            return Ok(());
        };

        let mention = match record.message.sender_staff_id.clone() {
            Some(staff_id) => Mention::users(vec![staff_id]),
            None => Mention::default(),
        };
        let reply = OutboundMessage::text(format!("echo: {content}")).with_mention(mention);
        let target = WebhookTarget::company(session_webhook, record.access_token.clone());

        self.sender
            .send(&target, &reply)
            .await
            .map_err(|error| HandlerError::Failure(error.to_string()))?;

        info!(
            event_name = "bridge.reply.sent",
            message_id = %record.message_id,
            "echoed inbound message through session webhook"
        );
        Ok(())
    }
}

/// Fallback handler used when the webhook side is disabled: records arrive,
/// get logged, and are dropped.
#[derive(Default)]
pub struct LoggingHandler;

#[async_trait]
impl RobotMessageHandler for LoggingHandler {
    async fn on_message(&self, record: InboundRecord) -> Result<(), HandlerError> {
        info!(
            event_name = "bridge.message.logged",
            message_id = %record.message_id,
            msgtype = record.message.msgtype.as_deref().unwrap_or("unknown"),
            "webhook disabled; inbound message logged and dropped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use dingbridge_stream::{InboundRecord, RobotMessage, RobotMessageHandler};
    use dingbridge_webhook::{ReplySender, SendError, WebhookPoster};

    use super::{LoggingHandler, SessionReplyHandler};

    #[derive(Default)]
    struct RecordingPoster {
        posts: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl WebhookPoster for RecordingPoster {
        async fn post_json(
            &self,
            url: &str,
            access_token: &str,
            body: &Value,
        ) -> Result<Value, SendError> {
            self.posts.lock().await.push((url.to_owned(), access_token.to_owned(), body.clone()));
            Ok(json!({"errcode": 0}))
        }
    }

    fn record_with(message: RobotMessage) -> InboundRecord {
        InboundRecord {
            access_token: "tok-1".to_owned(),
            message_id: "m1".to_owned(),
            message,
        }
    }

    #[tokio::test]
    async fn echoes_text_through_the_session_webhook() {
        let poster = Arc::new(RecordingPoster::default());
        let handler = SessionReplyHandler::new(ReplySender::new(poster.clone()));
        let message = RobotMessage::parse(
            r#"{
                "msgtype": "text",
                "text": {"content": "ping"},
                "senderStaffId": "staff-7",
                "sessionWebhook": "https://oapi.dingtalk.com/robot/sendBySession?session=s1"
            }"#,
        )
        .expect("parse");

        handler.on_message(record_with(message)).await.expect("handle");

        let posts = poster.posts.lock().await.clone();
        assert_eq!(posts.len(), 1);
        let (url, token, body) = &posts[0];
        assert_eq!(url, "https://oapi.dingtalk.com/robot/sendBySession?session=s1");
        assert_eq!(token, "tok-1");
        assert_eq!(body["text"]["content"], "echo: ping");
        assert_eq!(body["at"]["atUserIds"], json!(["staff-7"]));
    }

    #[tokio::test]
    async fn message_without_session_webhook_is_skipped() {
        let poster = Arc::new(RecordingPoster::default());
        let handler = SessionReplyHandler::new(ReplySender::new(poster.clone()));
        let message =
            RobotMessage::parse(r#"{"msgtype":"text","text":{"content":"hi"}}"#).expect("parse");

        handler.on_message(record_with(message)).await.expect("handle");

        assert!(poster.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_text_message_is_skipped() {
        let poster = Arc::new(RecordingPoster::default());
        let handler = SessionReplyHandler::new(ReplySender::new(poster.clone()));
        let message = RobotMessage::parse(
            r#"{"msgtype":"picture","sessionWebhook":"https://example.invalid/session"}"#,
        )
        .expect("parse");

        handler.on_message(record_with(message)).await.expect("handle");

        assert!(poster.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn logging_handler_always_succeeds() {
        let handler = LoggingHandler;
        let message = RobotMessage::parse(r#"{"msgtype":"text"}"#).expect("parse");
        handler.on_message(record_with(message)).await.expect("handle");
    }
}
