//! DingTalk webhook reply sender.
//!
//! The outbound half of the bridge: builds a message document from structured
//! fields or a raw JSON override, signs the webhook URL for custom robots,
//! and posts the document in a single HTTP call.
//!
//! # Key Types
//!
//! - `OutboundMessage` / `MessageKind` / `Mention` - What to send
//! - `WebhookTarget` / `RobotKind` - Where and how to authenticate
//! - `ReplySender` - Builds, signs, posts, returns the raw JSON response
//! - `WebhookPoster` - HTTP seam, implemented by `HttpWebhookPoster`
//!
//! Custom robots are throttled platform-side to 20 requests per minute; a
//! caller needing more throughput must use a company robot or throttle on
//! its own side. This crate never retries.

pub mod message;
pub mod sender;
pub mod sign;

pub use message::{build_document, BuildError, Mention, MessageKind, OutboundMessage};
pub use sender::{
    HttpWebhookPoster, ReplySender, RobotKind, SendError, WebhookPoster, WebhookTarget,
};
pub use sign::{compute_signature, signed_url, SignError};
