//! Newtype wrappers for feed identifiers.
//!
//! These keep account names, update ids and bot credentials from being mixed
//! up with arbitrary strings and integers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies one logical feed consumer (one bot account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// The account used when the configuration names none.
    pub const DEFAULT: &'static str = "default";

    pub fn new(s: impl Into<String>) -> Self {
        AccountId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a version of the id that is safe to embed in a file name.
    ///
    /// Ids made only of `[A-Za-z0-9_-]` are used as they are. Anything else
    /// has the other characters replaced with `_` and a short digest of the
    /// raw id appended, so distinct ids never share a stem.
    pub fn file_stem(&self) -> String {
        let is_safe = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if !self.0.is_empty() && self.0.chars().all(is_safe) {
            return self.0.clone();
        }

        let mut sanitised: String = self
            .0
            .chars()
            .map(|c| if is_safe(c) { c } else { '_' })
            .collect();
        if sanitised.is_empty() {
            sanitised.push('_');
        }
        let digest = Sha256::digest(self.0.as_bytes());
        let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        format!("{sanitised}-{suffix}")
    }
}

impl Default for AccountId {
    fn default() -> Self {
        AccountId::new(Self::DEFAULT)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        AccountId(s)
    }
}

/// A feed update identifier.
///
/// Update ids increase over time for a given account. The persisted offset is
/// the last id that was handled; the next fetch asks for `offset + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(pub i64);

impl UpdateId {
    /// The id immediately after this one.
    pub fn next(self) -> UpdateId {
        UpdateId(self.0.saturating_add(1))
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UpdateId {
    fn from(n: i64) -> Self {
        UpdateId(n)
    }
}

/// A bot API credential.
///
/// `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wraps a token, trimming surrounding whitespace.
    ///
    /// Returns `None` for a blank token.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(SecretToken(trimmed.to_string()))
        }
    }

    /// Returns the raw secret. Only call this when building a request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
