//! DingTalk stream-mode listener.
//!
//! This crate owns the inbound half of the bridge: a persistent stream
//! connection that delivers robot events, the per-event acknowledgment loop,
//! and the normalized record handed to a consumer callback.
//!
//! # Key Types
//!
//! - `StreamTransport` - Contract for the underlying push connection
//! - `RobotListener` - Event loop with acknowledgment and reconnection logic
//! - `RobotMessageHandler` - Consumer callback for normalized records
//! - `RobotMessage` - Parsed robot payload (opaque beyond echoed fields)
//!
//! Events are delivered to the handler sequentially, one at a time, on the
//! listener task. A slow handler delays delivery of the next event but never
//! delays the acknowledgment of the event it is handling.

pub mod listener;
pub mod message;
pub mod transport;

pub use dingbridge_core::config::TOPIC_ROBOT;
pub use listener::{
    HandlerError, ListenerOptions, PayloadError, ReconnectPolicy, RobotListener,
    RobotMessageHandler,
};
pub use message::{InboundEvent, InboundRecord, RobotMessage, StreamCredential, TextContent};
pub use transport::{NoopStreamTransport, StreamTransport, TransportError};
