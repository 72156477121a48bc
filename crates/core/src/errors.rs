use thiserror::Error;

/// Cross-cutting error taxonomy for the bridge.
///
/// Whatever layer an error originates in, it collapses into one of three
/// classes with distinct handling policies:
///
/// - `Configuration`: fatal to the single call that hit it, surfaced to the
///   caller immediately, never retried.
/// - `Payload`: scoped to one inbound event; must not terminate the stream
///   connection.
/// - `Transport`: connection drops and HTTP failures, propagated to the
///   caller untouched. Any retry policy is a caller decision.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("payload failure: {0}")]
    Payload(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl BridgeError {
    /// Stable class label for structured log fields.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Payload(_) => "payload",
            Self::Transport(_) => "transport",
        }
    }

    /// Only transport failures are ever worth retrying, and even then the
    /// retry belongs to the caller, not this crate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
