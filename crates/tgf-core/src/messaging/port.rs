use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    domain::{ChatRef, MessageRef},
    messaging::types::{InboundMessage, MediaRef, Peer},
    Result,
};

/// Transport port.
///
/// Telegram (teloxide) is the shipped implementation; tests use in-process
/// fakes. Send primitives may fail with `Error::RateLimited`, which the
/// delivery engine recovers by waiting and retrying.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Authenticate the underlying session.
    async fn connect(&self) -> Result<()>;

    /// Release the session. Safe to call more than once.
    async fn disconnect(&self) -> Result<()>;

    /// Resolve a (normalized) chat reference to a concrete peer.
    async fn resolve_entity(&self, reference: &ChatRef) -> Result<Peer>;

    /// Start listening for new messages in the given chats.
    ///
    /// Events arrive in order on the returned channel; the channel closes
    /// when the transport disconnects.
    async fn subscribe(&self, sources: &[Peer]) -> Result<mpsc::Receiver<InboundMessage>>;

    async fn send_message(&self, dest: &Peer, text: &str) -> Result<MessageRef>;

    async fn send_file(&self, dest: &Peer, media: &MediaRef, caption: &str)
        -> Result<MessageRef>;

    async fn forward_message(&self, dest: &Peer, message: &MessageRef) -> Result<MessageRef>;
}
