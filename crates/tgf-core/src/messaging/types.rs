use crate::domain::{ChatId, MessageRef};

/// A resolved destination: the transport's concrete handle for a chat.
///
/// Title/username are carried for log display only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub id: ChatId,
    pub title: Option<String>,
    pub username: Option<String>,
}

impl Peer {
    /// Human-readable name for logs: title, then @username, then the id.
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(username) = &self.username {
            return format!("@{username}");
        }
        self.id.0.to_string()
    }
}

/// An incoming chat message as seen by the routing core.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Identity of the original message, usable for forward operations.
    pub id: MessageRef,
    /// Trimmed primary text; empty when the message has none.
    pub text: String,
    /// Present when the message carries a media payload.
    pub media: Option<MediaRef>,
    /// Authored by the account itself.
    pub outgoing: bool,
}

/// Transport handle for a media payload, re-sendable without downloading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub file_id: String,
    pub kind: MediaKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Animation,
}
