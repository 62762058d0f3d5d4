use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::AccountConfig,
    delivery::DeliveryEngine,
    errors::Error,
    messaging::{port::MessageSource, types::InboundMessage},
    resolver::{normalize_chat_ref, TargetResolver},
    routing::Router,
    webhook::NotificationSink,
    Result,
};

/// Synthetic route name used for unmatched traffic.
const DEFAULT_ROUTE_NAME: &str = "default";

/// One account's whole lifecycle: subscribe to its sources and pump every
/// inbound message through route selection, resolution, delivery and
/// notification.
///
/// Workers are fully isolated from each other; this struct owns its
/// transport handle, resolver cache and configuration, and processes its
/// event stream strictly in arrival order.
pub struct AccountWorker {
    cfg: AccountConfig,
    source: Arc<dyn MessageSource>,
    router: Router,
    resolver: TargetResolver,
    delivery: DeliveryEngine,
    sink: NotificationSink,
    events: Option<mpsc::Receiver<InboundMessage>>,
}

impl AccountWorker {
    pub fn new(cfg: AccountConfig, source: Arc<dyn MessageSource>, http: reqwest::Client) -> Self {
        let router = Router::new(cfg.routes.clone(), cfg.default_route.clone());
        let resolver = TargetResolver::new(source.clone());
        let delivery = DeliveryEngine::new(source.clone());
        let sink = NotificationSink::new(cfg.name.clone(), cfg.webhook.clone(), http);
        Self {
            cfg,
            source,
            router,
            resolver,
            delivery,
            sink,
            events: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    /// Connect, resolve every configured source once, and subscribe.
    ///
    /// Any failure here is fatal to this worker's startup, and only this
    /// worker's.
    pub async fn start(&mut self) -> Result<()> {
        self.source
            .connect()
            .await
            .map_err(|e| Error::Startup(format!("connect failed: {e}")))?;
        info!("logged in as {}", self.cfg.name);

        let mut peers = Vec::with_capacity(self.cfg.sources.len());
        for source_ref in &self.cfg.sources {
            let peer = self
                .source
                .resolve_entity(&normalize_chat_ref(source_ref))
                .await
                .map_err(|e| {
                    Error::Startup(format!("cannot resolve source {source_ref}: {e}"))
                })?;
            info!("listening source: {}", peer.display_name());
            peers.push(peer);
        }

        let events = self
            .source
            .subscribe(&peers)
            .await
            .map_err(|e| Error::Startup(format!("subscribe failed: {e}")))?;
        self.events = Some(events);
        Ok(())
    }

    /// Consume events until cancellation or transport disconnect.
    ///
    /// Per-message failures are logged and skipped; only the lifecycle
    /// ends the loop.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let Some(mut events) = self.events.take() else {
            error!("run called before start");
            return;
        };
        info!("ready, waiting for messages");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(message) => {
                        if let Err(e) = self.handle_message(&message).await {
                            error!("error handling message: {e}");
                        }
                    }
                    None => {
                        warn!("source disconnected");
                        break;
                    }
                },
            }
        }
    }

    /// Release the transport session. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<()> {
        self.source.disconnect().await
    }

    async fn handle_message(&mut self, message: &InboundMessage) -> Result<()> {
        if self.cfg.skip_own && message.outgoing {
            return Ok(());
        }

        let text = message.text.as_str();
        let (route, is_default) = self.router.pick(text);
        let matched = !is_default;

        let (route_name, mode, target) = if let Some(route) = route {
            (route.name.clone(), route.mode, route.target.clone())
        } else {
            let default = self.router.default_route();
            let Some(target) = default.default_target.clone() else {
                // No default destination: unmatched traffic is dropped, but
                // the webhook still hears about it.
                self.sink.notify(DEFAULT_ROUTE_NAME, text, false).await;
                return Ok(());
            };
            (DEFAULT_ROUTE_NAME.to_string(), default.default_mode, target)
        };

        let dest = self.resolver.resolve(&target).await?;
        self.delivery.send(mode, &dest, message).await?;
        self.sink.notify(&route_name, text, matched).await;

        info!("#{route_name} -> {} [{mode}]", dest.display_name());
        Ok(())
    }
}
