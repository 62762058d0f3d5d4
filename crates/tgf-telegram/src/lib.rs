//! Telegram adapter (teloxide).
//!
//! This crate implements the `tgf-core` MessageSource port over the
//! Telegram Bot API.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use async_trait::async_trait;

use teloxide::{
    dispatching::{Dispatcher, ShutdownToken},
    dptree,
    prelude::*,
    types::{InputFile, Recipient},
};

use tokio::sync::mpsc;

use tgf_core::{
    domain::{ChatId, ChatRef, MessageId, MessageRef},
    errors::{Error, RateLimit},
    messaging::{
        port::MessageSource,
        types::{InboundMessage, MediaKind, MediaRef, Peer},
    },
    Result,
};

/// Capacity of the inbound event channel handed to the worker. When the
/// worker stalls on a rate-limit retry, the listener blocks here too.
const EVENT_BUFFER: usize = 64;

pub struct TelegramSource {
    bot: Bot,
    /// The bot's own user id, learned at connect; drives the outgoing flag.
    own_id: OnceLock<i64>,
    listener: Mutex<Option<ShutdownToken>>,
}

impl TelegramSource {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
            own_id: OnceLock::new(),
            listener: Mutex::new(None),
        }
    }

    fn tg_chat(peer: &Peer) -> teloxide::types::ChatId {
        teloxide::types::ChatId(peer.id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        match e {
            teloxide::RequestError::RetryAfter(wait) => {
                Error::RateLimited(RateLimit::RetryAfter {
                    seconds: Some(wait.as_secs()),
                })
            }
            other => Error::Transport(format!("telegram error: {other}")),
        }
    }

    fn listener_guard(&self) -> MutexGuard<'_, Option<ShutdownToken>> {
        match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Map a (normalized) chat reference onto a Bot API recipient. Numeric
/// strings are treated as ids, everything else as a public username.
fn recipient(reference: &ChatRef) -> Recipient {
    match reference {
        ChatRef::Id(id) => Recipient::Id(teloxide::types::ChatId(*id)),
        ChatRef::Handle(handle) => match handle.parse::<i64>() {
            Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
            Err(_) => Recipient::ChannelUsername(format!("@{handle}")),
        },
    }
}

fn peer_from_chat(chat: &teloxide::types::Chat) -> Peer {
    Peer {
        id: ChatId(chat.id.0),
        title: chat.title().map(str::to_string),
        username: chat.username().map(str::to_string),
    }
}

fn media_ref(msg: &Message) -> Option<MediaRef> {
    if let Some(sizes) = msg.photo() {
        // Telegram lists sizes smallest first; re-send the largest.
        return sizes.last().map(|size| MediaRef {
            file_id: size.file.id.clone(),
            kind: MediaKind::Photo,
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaRef {
            file_id: video.file.id.clone(),
            kind: MediaKind::Video,
        });
    }
    if let Some(document) = msg.document() {
        return Some(MediaRef {
            file_id: document.file.id.clone(),
            kind: MediaKind::Document,
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(MediaRef {
            file_id: audio.file.id.clone(),
            kind: MediaKind::Audio,
        });
    }
    if let Some(voice) = msg.voice() {
        return Some(MediaRef {
            file_id: voice.file.id.clone(),
            kind: MediaKind::Voice,
        });
    }
    if let Some(animation) = msg.animation() {
        return Some(MediaRef {
            file_id: animation.file.id.clone(),
            kind: MediaKind::Animation,
        });
    }
    None
}

fn convert_message(msg: &Message, own_id: Option<i64>) -> InboundMessage {
    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or("")
        .trim()
        .to_string();
    let outgoing = match (own_id, msg.from()) {
        (Some(own), Some(user)) => user.id.0 as i64 == own,
        _ => false,
    };
    InboundMessage {
        id: MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        },
        text,
        media: media_ref(msg),
        outgoing,
    }
}

/// Listener state injected into the dptree handler.
#[derive(Clone)]
struct ListenerCtx {
    tx: mpsc::Sender<InboundMessage>,
    allowed: Arc<HashSet<i64>>,
    own_id: Option<i64>,
}

async fn on_message(msg: Message, ctx: ListenerCtx) -> ResponseResult<()> {
    if ctx.allowed.contains(&msg.chat.id.0) {
        let inbound = convert_message(&msg, ctx.own_id);
        // Send errors mean the worker is gone; nothing left to do here.
        let _ = ctx.tx.send(inbound).await;
    }
    Ok(())
}

#[async_trait]
impl MessageSource for TelegramSource {
    async fn connect(&self) -> Result<()> {
        let me = self.bot.get_me().await.map_err(Self::map_err)?;
        let _ = self.own_id.set(me.id.0 as i64);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let token = self.listener_guard().take();
        if let Some(token) = token {
            if let Ok(stopped) = token.shutdown() {
                stopped.await;
            }
        }
        Ok(())
    }

    async fn resolve_entity(&self, reference: &ChatRef) -> Result<Peer> {
        let chat = self
            .bot
            .get_chat(recipient(reference))
            .await
            .map_err(|e| Error::Resolution {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;
        Ok(peer_from_chat(&chat))
    }

    async fn subscribe(&self, sources: &[Peer]) -> Result<mpsc::Receiver<InboundMessage>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let ctx = ListenerCtx {
            tx,
            allowed: Arc::new(sources.iter().map(|peer| peer.id.0).collect()),
            own_id: self.own_id.get().copied(),
        };

        let handler = Update::filter_message().endpoint(on_message);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![ctx])
            .build();

        *self.listener_guard() = Some(dispatcher.shutdown_token());
        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        Ok(rx)
    }

    async fn send_message(&self, dest: &Peer, text: &str) -> Result<MessageRef> {
        let sent = self
            .bot
            .send_message(Self::tg_chat(dest), text.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }

    async fn send_file(&self, dest: &Peer, media: &MediaRef, caption: &str) -> Result<MessageRef> {
        let chat = Self::tg_chat(dest);
        let input = InputFile::file_id(media.file_id.clone());
        let sent = match media.kind {
            MediaKind::Photo => {
                let mut req = self.bot.send_photo(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
            MediaKind::Video => {
                let mut req = self.bot.send_video(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
            MediaKind::Document => {
                let mut req = self.bot.send_document(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
            MediaKind::Voice => {
                let mut req = self.bot.send_voice(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
            MediaKind::Animation => {
                let mut req = self.bot.send_animation(chat, input);
                if !caption.is_empty() {
                    req = req.caption(caption.to_string());
                }
                req.await
            }
        }
        .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }

    async fn forward_message(&self, dest: &Peer, message: &MessageRef) -> Result<MessageRef> {
        let sent = self
            .bot
            .forward_message(
                Self::tg_chat(dest),
                teloxide::types::ChatId(message.chat_id.0),
                teloxide::types::MessageId(message.message_id.0),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id.0),
            message_id: MessageId(sent.id.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_after_maps_to_a_rate_limit_signal() {
        let err = TelegramSource::map_err(teloxide::RequestError::RetryAfter(
            Duration::from_secs(30),
        ));
        match err {
            Error::RateLimited(RateLimit::RetryAfter { seconds }) => {
                assert_eq!(seconds, Some(30));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn recipient_parses_numeric_handles_as_ids() {
        assert!(matches!(
            recipient(&ChatRef::Id(-100123)),
            Recipient::Id(teloxide::types::ChatId(-100123))
        ));
        assert!(matches!(
            recipient(&ChatRef::Handle("-100123".to_string())),
            Recipient::Id(teloxide::types::ChatId(-100123))
        ));
        match recipient(&ChatRef::Handle("shop".to_string())) {
            Recipient::ChannelUsername(name) => assert_eq!(name, "@shop"),
            other => panic!("unexpected recipient: {other:?}"),
        }
    }
}
