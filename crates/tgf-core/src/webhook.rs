use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;

/// Error response bodies are truncated to this many chars in logs.
const BODY_LOG_MAX: usize = 500;

#[derive(Serialize)]
struct Notification<'a> {
    account_name: &'a str,
    route_name: &'a str,
    text: &'a str,
}

/// Decide whether a routing outcome should be announced.
///
/// Matched routes pass the allow-list (empty allows all); unmatched traffic
/// is gated by `send_unmatched`.
pub fn should_notify(cfg: &WebhookConfig, route_name: &str, matched: bool) -> bool {
    if matched {
        cfg.routes.is_empty() || cfg.routes.iter().any(|r| r == route_name)
    } else {
        cfg.send_unmatched
    }
}

/// Best-effort webhook announcements for routing decisions.
///
/// Failures never propagate: a webhook outage must not affect a delivery
/// that already happened.
pub struct NotificationSink {
    account: String,
    cfg: Option<WebhookConfig>,
    http: reqwest::Client,
}

impl NotificationSink {
    pub fn new(account: String, cfg: Option<WebhookConfig>, http: reqwest::Client) -> Self {
        Self { account, cfg, http }
    }

    /// POST the routing decision to the configured endpoint, if any.
    pub async fn notify(&self, route_name: &str, text: &str, matched: bool) {
        let Some(cfg) = &self.cfg else {
            return;
        };
        if !should_notify(cfg, route_name, matched) {
            return;
        }

        let payload = Notification {
            account_name: &self.account,
            route_name,
            text,
        };

        let result = self
            .http
            .post(&cfg.url)
            .bearer_auth(&cfg.token)
            .timeout(Duration::from_secs(cfg.timeout))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().as_u16() >= 400 => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("webhook HTTP {status}: {}", truncate(&body, BODY_LOG_MAX));
            }
            Ok(_) => info!("webhook sent: {route_name}"),
            Err(e) => error!("webhook error: {e}"),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
