//! Duplex channel to the recognition backend
//!
//! One long-lived connection per user identity carries outbound voice
//! payloads and inbound recognition events. Subscriptions are keyed by
//! event kind and may be shared by several orchestrators.

pub mod messages;
pub mod nats;
pub mod registry;

pub use messages::{ChannelEvent, ClientMessage, EventKind, Route};
pub use nats::NatsChannel;
pub use registry::{EventHandler, HandlerRegistry, SubscriptionId};

use crate::error::ChannelError;

#[async_trait::async_trait]
pub trait DuplexChannel: Send + Sync {
    /// Establish the connection for `user_id`. Repeated calls for the same
    /// identity are no-ops.
    async fn connect(&self, user_id: &str) -> Result<(), ChannelError>;

    fn is_connected(&self) -> bool;

    /// Subscribe to one event kind; several handlers per kind are allowed
    fn on(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId;

    fn off(&self, id: SubscriptionId);

    fn off_all(&self);

    /// Queue a voice payload for the backend. Failures, including a missing
    /// connection, are logged and not reported to the caller.
    async fn send_voice_payload(&self, audio: &str, format: &str, sample_rate: u32);
}
