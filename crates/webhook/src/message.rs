use serde_json::{json, Map, Value};
use thiserror::Error;

pub const MSGTYPE_TEXT: &str = "text";
pub const MSGTYPE_MARKDOWN: &str = "markdown";

/// The @-mention block carried by every outbound document. Mentioning
/// everyone and mentioning specific users are mutually exclusive: turning on
/// `is_at_all` clears the user id list at construction time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mention {
    at_user_ids: Vec<String>,
    is_at_all: bool,
}

impl Mention {
    pub fn users(at_user_ids: Vec<String>) -> Self {
        Self { at_user_ids, is_at_all: false }
    }

    pub fn everyone() -> Self {
        Self { at_user_ids: Vec::new(), is_at_all: true }
    }

    pub fn new(at_user_ids: Vec<String>, is_at_all: bool) -> Self {
        if is_at_all {
            Self::everyone()
        } else {
            Self::users(at_user_ids)
        }
    }

    pub fn at_user_ids(&self) -> &[String] {
        &self.at_user_ids
    }

    pub fn is_at_all(&self) -> bool {
        self.is_at_all
    }

    fn to_value(&self) -> Value {
        json!({
            "atUserIds": self.at_user_ids,
            "isAtAll": self.is_at_all,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageKind {
    Text { content: String },
    Markdown { title: String, text: String },
    /// Caller supplies the entire document; it shallow-merges over the
    /// default mention block, override winning on key collision.
    Raw(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub mention: Mention,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { kind: MessageKind::Text { content: content.into() }, mention: Mention::default() }
    }

    pub fn markdown(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Markdown { title: title.into(), text: text.into() },
            mention: Mention::default(),
        }
    }

    pub fn raw(document: Value) -> Self {
        Self { kind: MessageKind::Raw(document), mention: Mention::default() }
    }

    pub fn with_mention(mut self, mention: Mention) -> Self {
        self.mention = mention;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("document resolves to no msgtype")]
    MissingMsgType,
    #[error("raw override must be a JSON object, got {0}")]
    OverrideNotObject(&'static str),
}

/// Builds the wire document: `{at: {...}}` first, then either the structured
/// `msgtype` + block, or the raw override merged shallowly on top.
///
/// The merge is deliberately shallow: an override `at` key replaces the whole
/// default mention block rather than deep-merging into it.
pub fn build_document(message: &OutboundMessage) -> Result<Value, BuildError> {
    let mut document = Map::new();
    document.insert("at".to_owned(), message.mention.to_value());

    match &message.kind {
        MessageKind::Text { content } => {
            document.insert("msgtype".to_owned(), Value::String(MSGTYPE_TEXT.to_owned()));
            document.insert("text".to_owned(), json!({ "content": content }));
        }
        MessageKind::Markdown { title, text } => {
            document.insert("msgtype".to_owned(), Value::String(MSGTYPE_MARKDOWN.to_owned()));
            document.insert("markdown".to_owned(), json!({ "title": title, "text": text }));
        }
        MessageKind::Raw(override_value) => {
            let Value::Object(override_map) = override_value else {
                return Err(BuildError::OverrideNotObject(json_type_name(override_value)));
            };
            for (key, value) in override_map {
                document.insert(key.clone(), value.clone());
            }
        }
    }

    match document.get("msgtype") {
        Some(Value::String(msgtype)) if !msgtype.trim().is_empty() => {}
        _ => return Err(BuildError::MissingMsgType),
    }

    Ok(Value::Object(document))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
