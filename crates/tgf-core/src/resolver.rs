use std::{collections::HashMap, sync::Arc};

use crate::{
    domain::ChatRef,
    messaging::{port::MessageSource, types::Peer},
    Result,
};

/// Strip the t.me URL prefix and the `@` sigil from a handle reference.
/// Numeric ids pass through untouched.
pub fn normalize_chat_ref(reference: &ChatRef) -> ChatRef {
    match reference {
        ChatRef::Id(id) => ChatRef::Id(*id),
        ChatRef::Handle(handle) => {
            let mut handle = handle.trim();
            if let Some(rest) = handle.strip_prefix("https://t.me/") {
                handle = rest;
            }
            if let Some(rest) = handle.strip_prefix('@') {
                handle = rest;
            }
            ChatRef::Handle(handle.to_string())
        }
    }
}

/// Per-worker destination resolution with lifetime memoization.
///
/// The cache is keyed by the reference as written in config, not by its
/// normalized form. Entries never expire; a handle gone stale surfaces
/// later as a transport error on send, not here.
pub struct TargetResolver {
    source: Arc<dyn MessageSource>,
    cache: HashMap<ChatRef, Peer>,
}

impl TargetResolver {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    /// Resolve `reference`, consulting the cache first.
    ///
    /// Failure aborts handling of the current message only; the worker
    /// keeps running.
    pub async fn resolve(&mut self, reference: &ChatRef) -> Result<Peer> {
        if let Some(peer) = self.cache.get(reference) {
            return Ok(peer.clone());
        }
        let peer = self
            .source
            .resolve_entity(&normalize_chat_ref(reference))
            .await?;
        self.cache.insert(reference.clone(), peer.clone());
        Ok(peer)
    }
}
