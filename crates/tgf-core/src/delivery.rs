use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::warn;

use crate::{
    config::RouteMode,
    domain::MessageRef,
    errors::Error,
    messaging::{
        port::MessageSource,
        types::{InboundMessage, Peer},
    },
    Result,
};

/// Clock seam for the retry loop; tests record sleeps instead of waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Executes a routing decision against a resolved destination.
///
/// Every transport call is wrapped in an unbounded wait-and-retry loop on
/// rate-limit signals: the owning worker's message stream stalls rather
/// than drop the message. Other transport errors propagate to the
/// per-message handler.
pub struct DeliveryEngine {
    source: Arc<dyn MessageSource>,
    sleeper: Arc<dyn Sleeper>,
}

impl DeliveryEngine {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self::with_sleeper(source, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(source: Arc<dyn MessageSource>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { source, sleeper }
    }

    /// Deliver `message` to `dest` in the given mode.
    ///
    /// Returns `None` when there was nothing to send: copy mode with no
    /// media and no text (service messages are skipped silently).
    pub async fn send(
        &self,
        mode: RouteMode,
        dest: &Peer,
        message: &InboundMessage,
    ) -> Result<Option<MessageRef>> {
        match mode {
            RouteMode::Forward => {
                let sent = self
                    .resilient(|| self.source.forward_message(dest, &message.id))
                    .await?;
                Ok(Some(sent))
            }
            RouteMode::Copy => {
                if let Some(media) = &message.media {
                    let sent = self
                        .resilient(|| self.source.send_file(dest, media, &message.text))
                        .await?;
                    Ok(Some(sent))
                } else if !message.text.is_empty() {
                    let sent = self
                        .resilient(|| self.source.send_message(dest, &message.text))
                        .await?;
                    Ok(Some(sent))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Retry `op` for as long as the transport reports rate limiting,
    /// sleeping the server-requested wait plus one second each time. No
    /// backoff growth, no retry cap.
    async fn resilient<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(Error::RateLimited(signal)) => {
                    let wait = signal.wait_seconds();
                    warn!("{signal}: waiting and will retry");
                    self.sleeper.sleep(Duration::from_secs(wait + 1)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, ChatRef, MessageId};
    use crate::errors::RateLimit;
    use crate::messaging::types::{MediaKind, MediaRef};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct FakeTransport {
        failures: Mutex<VecDeque<Error>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(failures: Vec<Error>) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, call: String) -> Result<MessageRef> {
            self.calls.lock().unwrap().push(call);
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(MessageRef {
                    chat_id: ChatId(7),
                    message_id: MessageId(1),
                }),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSource for FakeTransport {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn resolve_entity(&self, reference: &ChatRef) -> Result<Peer> {
            Err(Error::Resolution {
                reference: reference.to_string(),
                reason: "not used".to_string(),
            })
        }

        async fn subscribe(&self, _sources: &[Peer]) -> Result<mpsc::Receiver<InboundMessage>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send_message(&self, _dest: &Peer, text: &str) -> Result<MessageRef> {
            self.record(format!("message:{text}"))
        }

        async fn send_file(
            &self,
            _dest: &Peer,
            media: &MediaRef,
            caption: &str,
        ) -> Result<MessageRef> {
            self.record(format!("file:{}:{caption}", media.file_id))
        }

        async fn forward_message(&self, _dest: &Peer, message: &MessageRef) -> Result<MessageRef> {
            self.record(format!("forward:{}", message.message_id.0))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn peer() -> Peer {
        Peer {
            id: ChatId(7),
            title: None,
            username: None,
        }
    }

    fn msg(text: &str, media: Option<MediaRef>) -> InboundMessage {
        InboundMessage {
            id: MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(5),
            },
            text: text.to_string(),
            media,
            outgoing: false,
        }
    }

    fn make_engine(transport: Arc<FakeTransport>) -> (DeliveryEngine, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        (
            DeliveryEngine::with_sleeper(transport, sleeper.clone()),
            sleeper,
        )
    }

    #[tokio::test]
    async fn copy_with_no_content_sends_nothing() {
        let transport = FakeTransport::new(vec![]);
        let (engine, _) = make_engine(transport.clone());

        let sent = engine
            .send(RouteMode::Copy, &peer(), &msg("", None))
            .await
            .unwrap();

        assert!(sent.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn copy_prefers_media_with_text_as_caption() {
        let transport = FakeTransport::new(vec![]);
        let (engine, _) = make_engine(transport.clone());
        let media = MediaRef {
            file_id: "f1".to_string(),
            kind: MediaKind::Photo,
        };

        let sent = engine
            .send(RouteMode::Copy, &peer(), &msg("hi", Some(media)))
            .await
            .unwrap();

        assert!(sent.is_some());
        assert_eq!(transport.calls(), vec!["file:f1:hi".to_string()]);
    }

    #[tokio::test]
    async fn copy_text_only_sends_a_message() {
        let transport = FakeTransport::new(vec![]);
        let (engine, _) = make_engine(transport.clone());

        engine
            .send(RouteMode::Copy, &peer(), &msg("hello", None))
            .await
            .unwrap();

        assert_eq!(transport.calls(), vec!["message:hello".to_string()]);
    }

    #[tokio::test]
    async fn forward_uses_the_message_identity() {
        let transport = FakeTransport::new(vec![]);
        let (engine, _) = make_engine(transport.clone());

        // Empty text: forward never inspects content.
        engine
            .send(RouteMode::Forward, &peer(), &msg("", None))
            .await
            .unwrap();

        assert_eq!(transport.calls(), vec!["forward:5".to_string()]);
    }

    #[tokio::test]
    async fn rate_limits_sleep_wait_plus_one_and_retry() {
        let transport = FakeTransport::new(vec![
            Error::RateLimited(RateLimit::FloodWait { seconds: Some(4) }),
            Error::RateLimited(RateLimit::SlowMode { seconds: None }),
        ]);
        let (engine, sleeper) = make_engine(transport.clone());

        let sent = engine
            .send(RouteMode::Copy, &peer(), &msg("hello", None))
            .await
            .unwrap();

        assert!(sent.is_some());
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(5), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn other_transport_errors_propagate_without_retry() {
        let transport = FakeTransport::new(vec![Error::Transport("boom".to_string())]);
        let (engine, sleeper) = make_engine(transport.clone());

        let err = engine
            .send(RouteMode::Forward, &peer(), &msg("x", None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(transport.calls().len(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }
}
