use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use dingbridge_core::config::{AppConfig, LoadOptions};
use dingbridge_webhook::{
    HttpWebhookPoster, Mention, MessageKind, OutboundMessage, ReplySender, WebhookTarget,
};

use super::CommandResult;

#[derive(Debug, Args)]
pub struct SendArgs {
    #[arg(long, help = "Plain text message content")]
    pub text: Option<String>,
    #[arg(long, help = "Markdown message title (first-screen preview)")]
    pub markdown_title: Option<String>,
    #[arg(long, help = "Markdown message body")]
    pub markdown_text: Option<String>,
    #[arg(long, help = "Raw JSON document replacing the structured fields")]
    pub raw: Option<String>,
    #[arg(long, value_delimiter = ',', help = "User ids to @-mention, comma separated")]
    pub at_user_ids: Vec<String>,
    #[arg(long, help = "Mention everyone (clears --at-user-ids)")]
    pub at_all: bool,
}

pub fn run(args: SendArgs) -> CommandResult {
    let message = match build_message(&args) {
        Ok(message) => message,
        Err(detail) => return CommandResult::failure("send", "configuration", detail, 2),
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("send", "configuration", error.to_string(), 2)
        }
    };

    let target = match WebhookTarget::from_config(&config.webhook) {
        Ok(target) => target,
        Err(error) => {
            return CommandResult::failure("send", "configuration", error.to_string(), 2)
        }
    };

    let poster = match HttpWebhookPoster::new(Duration::from_secs(config.webhook.timeout_secs)) {
        Ok(poster) => poster,
        Err(error) => {
            return CommandResult::failure("send", "configuration", error.to_string(), 2)
        }
    };
    let sender = ReplySender::new(Arc::new(poster));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("send", "runtime", error.to_string(), 1),
    };

    match runtime.block_on(sender.send(&target, &message)) {
        Ok(response) => CommandResult::success("send", response.to_string()),
        Err(error) => {
            let class = dingbridge_core::BridgeError::from(error.clone()).class();
            CommandResult::failure("send", class, error.to_string(), 1)
        }
    }
}

fn build_message(args: &SendArgs) -> Result<OutboundMessage, String> {
    let kind = match (&args.text, &args.markdown_title, &args.markdown_text, &args.raw) {
        (Some(content), None, None, None) => MessageKind::Text { content: content.clone() },
        (None, Some(title), Some(text), None) => {
            MessageKind::Markdown { title: title.clone(), text: text.clone() }
        }
        (None, None, None, Some(raw)) => {
            let document = serde_json::from_str(raw)
                .map_err(|error| format!("--raw is not valid JSON: {error}"))?;
            MessageKind::Raw(document)
        }
        (None, Some(_), None, None) | (None, None, Some(_), None) => {
            return Err("markdown requires both --markdown-title and --markdown-text".to_owned())
        }
        (None, None, None, None) => {
            return Err(
                "one of --text, --markdown-title/--markdown-text, or --raw is required".to_owned()
            )
        }
        _ => return Err("--text, markdown flags, and --raw are mutually exclusive".to_owned()),
    };

    let mention = Mention::new(args.at_user_ids.clone(), args.at_all);
    Ok(OutboundMessage { kind, mention })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{build_message, SendArgs};
    use dingbridge_webhook::MessageKind;

    fn args() -> SendArgs {
        SendArgs {
            text: None,
            markdown_title: None,
            markdown_text: None,
            raw: None,
            at_user_ids: Vec::new(),
            at_all: false,
        }
    }

    #[test]
    fn text_flag_builds_a_text_message() {
        let message = build_message(&SendArgs { text: Some("hi".to_owned()), ..args() })
            .expect("message");
        assert!(matches!(message.kind, MessageKind::Text { ref content } if content == "hi"));
    }

    #[test]
    fn markdown_requires_both_flags() {
        let result =
            build_message(&SendArgs { markdown_title: Some("T".to_owned()), ..args() });
        assert!(result.is_err());
    }

    #[test]
    fn raw_flag_parses_json() {
        let message = build_message(&SendArgs {
            raw: Some(r#"{"msgtype":"text","text":{"content":"x"}}"#.to_owned()),
            ..args()
        })
        .expect("message");
        assert!(
            matches!(message.kind, MessageKind::Raw(ref value) if value["msgtype"] == json!("text"))
        );
    }

    #[test]
    fn invalid_raw_json_is_rejected() {
        let result = build_message(&SendArgs { raw: Some("{{".to_owned()), ..args() });
        assert!(result.is_err());
    }

    #[test]
    fn mixed_modes_are_rejected() {
        let result = build_message(&SendArgs {
            text: Some("hi".to_owned()),
            raw: Some("{}".to_owned()),
            ..args()
        });
        assert!(result.is_err());
    }

    #[test]
    fn at_all_clears_explicit_user_ids() {
        let message = build_message(&SendArgs {
            text: Some("hi".to_owned()),
            at_user_ids: vec!["u1".to_owned()],
            at_all: true,
            ..args()
        })
        .expect("message");
        assert!(message.mention.is_at_all());
        assert!(message.mention.at_user_ids().is_empty());
    }

    #[test]
    fn no_content_flags_is_an_error() {
        assert!(build_message(&args()).is_err());
    }
}
