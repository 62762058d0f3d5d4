use std::{fmt, fs, path::Path};

use serde::Deserialize;

use crate::{domain::ChatRef, errors::Error, Result};

/// Top-level configuration: the accounts to run.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Load and validate a YAML config file.
    ///
    /// Structural problems (missing required fields, wrong types) surface
    /// here as `Error::Config` and are fatal to process startup.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(Error::Config("no accounts configured".to_string()));
        }
        for account in &self.accounts {
            account.validate()?;
        }
        Ok(())
    }
}

/// One account's full configuration. Immutable after load; owned exclusively
/// by the worker that runs it.
#[derive(Clone, Debug, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    /// Transport credential; opaque to the routing core.
    pub token: String,
    /// Ignore messages authored by the account itself.
    #[serde(default = "default_true")]
    pub skip_own: bool,
    /// Chats to monitor.
    #[serde(default)]
    pub sources: Vec<ChatRef>,
    /// Evaluated in declaration order; the first match wins.
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub default_route: DefaultRoute,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl AccountConfig {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("account with empty name".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(Error::Config(format!(
                "account {}: empty token",
                self.name
            )));
        }
        Ok(())
    }
}

/// A named rule mapping a keyword condition to a destination and mode.
#[derive(Clone, Debug, Deserialize)]
pub struct Route {
    pub name: String,
    pub mode: RouteMode,
    pub target: ChatRef,
    #[serde(rename = "match", default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub keywords: Vec<KeywordEntry>,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// `forward` keeps the original attribution header; `copy` re-sends the
/// content as a new message.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Forward,
    #[default]
    Copy,
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteMode::Forward => "forward",
            RouteMode::Copy => "copy",
        })
    }
}

/// How a keyword group's hits reduce: every keyword or any keyword.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    All,
    #[default]
    Any,
}

/// One entry of a route's `keywords` field: a plain keyword or a group of
/// alternatives.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum KeywordEntry {
    One(String),
    Group(Vec<String>),
}

/// Fallback used when no route matches. An absent target means unmatched
/// traffic is not delivered anywhere.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DefaultRoute {
    #[serde(default)]
    pub default_target: Option<ChatRef>,
    #[serde(default)]
    pub default_mode: RouteMode,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Bearer credential sent with every notification.
    pub token: String,
    /// Route-name allow-list; empty allows every matched route.
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default = "default_true")]
    pub send_unmatched: bool,
    /// Request timeout in seconds.
    #[serde(default = "default_webhook_timeout")]
    pub timeout: u64,
}

fn default_true() -> bool {
    true
}

fn default_webhook_timeout() -> u64 {
    10
}
