//! Configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `FEED_OWNER_ACCOUNT` | `default` |
//! | `FEED_OWNER_TOKEN` or `FEED_OWNER_TOKEN_FILE` | none |
//! | `FEED_OWNER_PROXY` | none |
//! | `FEED_OWNER_API_BASE` | `https://api.telegram.org` |
//! | `FEED_OWNER_STATE_DIR` | `./state` |
//! | `FEED_OWNER_MAX_CONCURRENT` | `4` |
//! | `FEED_OWNER_WEBHOOK_URL` | none (polling mode) |
//! | `FEED_OWNER_WEBHOOK_HOST` | `0.0.0.0` |
//! | `FEED_OWNER_WEBHOOK_PORT` | `8787` |
//! | `FEED_OWNER_WEBHOOK_PATH` | `/telegram-webhook` |
//! | `FEED_OWNER_WEBHOOK_SECRET` | none |
//!
//! Blank values count as unset. A missing token is not a configuration
//! error by itself; the engine refuses to start without one.

pub mod account;

use std::path::PathBuf;

use thiserror::Error;

use crate::runner::DEFAULT_CONCURRENCY;
use crate::types::{AccountId, SecretToken};

pub use account::{Account, FeedMode, WebhookSettings};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_STATE_DIR: &str = "./state";
const DEFAULT_WEBHOOK_HOST: &str = "0.0.0.0";
const DEFAULT_WEBHOOK_PORT: u16 = 8787;
const DEFAULT_WEBHOOK_PATH: &str = "/telegram-webhook";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No bot token is configured for the account.
    #[error("no bot token configured for account {account}")]
    MissingToken { account: AccountId },

    /// A numeric variable did not parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    /// The token file could not be read.
    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The webhook path does not start with `/`.
    #[error("webhook path must start with '/': {0:?}")]
    InvalidWebhookPath(String),
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub account: Account,
    pub api_base: String,
    pub state_dir: PathBuf,
    pub max_concurrent: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let id = AccountId::new(get("FEED_OWNER_ACCOUNT").unwrap_or_else(|| AccountId::DEFAULT.to_string()));

        let token = match get("FEED_OWNER_TOKEN") {
            Some(raw) => SecretToken::new(raw),
            None => match get("FEED_OWNER_TOKEN_FILE") {
                Some(path) => {
                    let path = PathBuf::from(path);
                    let raw = std::fs::read_to_string(&path)
                        .map_err(|source| ConfigError::TokenFile { path, source })?;
                    SecretToken::new(raw)
                }
                None => None,
            },
        };

        let webhook = match get("FEED_OWNER_WEBHOOK_URL") {
            Some(url) => {
                let path = get("FEED_OWNER_WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
                if !path.starts_with('/') {
                    return Err(ConfigError::InvalidWebhookPath(path));
                }
                Some(WebhookSettings {
                    url,
                    host: get("FEED_OWNER_WEBHOOK_HOST").unwrap_or_else(|| DEFAULT_WEBHOOK_HOST.to_string()),
                    port: parse_number(&get, "FEED_OWNER_WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT)?,
                    path,
                    secret: get("FEED_OWNER_WEBHOOK_SECRET").and_then(SecretToken::new),
                })
            }
            None => None,
        };

        let max_concurrent: usize =
            parse_number(&get, "FEED_OWNER_MAX_CONCURRENT", DEFAULT_CONCURRENCY)?;

        Ok(Config {
            account: Account {
                id,
                token,
                proxy: get("FEED_OWNER_PROXY"),
                webhook,
            },
            api_base: get("FEED_OWNER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            state_dir: get("FEED_OWNER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            max_concurrent: max_concurrent.max(1),
        })
    }

    /// The account's token, or `MissingToken`.
    pub fn require_token(&self) -> Result<&SecretToken> {
        self.account
            .token
            .as_ref()
            .ok_or_else(|| ConfigError::MissingToken {
                account: self.account.id.clone(),
            })
    }
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T> {
    match get(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}
