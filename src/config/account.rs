//! Resolved account settings.

use std::fmt;

use crate::types::{AccountId, SecretToken};

/// How updates reach this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// Long-poll the feed; ownership is contended between processes.
    Polling,

    /// The feed pushes updates to an HTTP listener.
    Webhook,
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedMode::Polling => f.write_str("polling"),
            FeedMode::Webhook => f.write_str("webhook"),
        }
    }
}

/// Listener and registration settings for webhook mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Public URL registered with the feed.
    pub url: String,

    /// Local bind host.
    pub host: String,

    /// Local bind port.
    pub port: u16,

    /// Request path updates are posted to. Always starts with `/`.
    pub path: String,

    /// Secret the feed must echo in the secret-token header.
    pub secret: Option<SecretToken>,
}

impl WebhookSettings {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One feed consumer, resolved once per engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub token: Option<SecretToken>,
    pub proxy: Option<String>,
    pub webhook: Option<WebhookSettings>,
}

impl Account {
    /// A polling account with the given token.
    pub fn polling(id: impl Into<AccountId>, token: SecretToken) -> Self {
        Account {
            id: id.into(),
            token: Some(token),
            proxy: None,
            webhook: None,
        }
    }

    /// Switches the account to webhook mode.
    pub fn with_webhook(mut self, webhook: WebhookSettings) -> Self {
        self.webhook = Some(webhook);
        self
    }

    /// Webhook mode if webhook settings are present, polling otherwise.
    pub fn mode(&self) -> FeedMode {
        if self.webhook.is_some() {
            FeedMode::Webhook
        } else {
            FeedMode::Polling
        }
    }
}
