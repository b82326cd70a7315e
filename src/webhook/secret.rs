//! Webhook secret-token verification.
//!
//! The feed echoes the configured secret in the
//! `X-Telegram-Bot-Api-Secret-Token` header of every delivery. The header is
//! compared against the secret in constant time: both values are run through
//! HMAC-SHA256 under the same key and the digests are compared with the HMAC
//! library's constant-time check, so neither the length nor the content of
//! the secret leaks through timing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::SecretToken;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Fixed HMAC key. Only used to normalise both sides to equal-length digests.
const DIGEST_KEY: &[u8] = b"feed-owner/webhook-secret";

fn digest(value: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(DIGEST_KEY).ok()?;
    mac.update(value);
    Some(mac)
}

/// Returns true if `provided` equals the expected secret.
pub fn verify_secret(expected: &SecretToken, provided: &str) -> bool {
    let (Some(expected_mac), Some(provided_mac)) = (
        digest(expected.expose().as_bytes()),
        digest(provided.as_bytes()),
    ) else {
        return false;
    };

    let expected_tag = expected_mac.finalize().into_bytes();
    provided_mac.verify_slice(&expected_tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret(s: &str) -> SecretToken {
        SecretToken::new(s).unwrap()
    }

    #[test]
    fn matching_secret_verifies() {
        assert!(verify_secret(&secret("s3cret"), "s3cret"));
    }

    #[test]
    fn wrong_secret_fails() {
        assert!(!verify_secret(&secret("s3cret"), "s3cret2"));
        assert!(!verify_secret(&secret("s3cret"), "S3CRET"));
    }

    #[test]
    fn empty_header_fails() {
        assert!(!verify_secret(&secret("s3cret"), ""));
    }

    proptest! {
        #[test]
        fn verifies_iff_equal(a in "[A-Za-z0-9_-]{1,64}", b in "[A-Za-z0-9_-]{0,64}") {
            prop_assert_eq!(verify_secret(&secret(&a), &b), a == b);
        }

        #[test]
        fn any_secret_verifies_against_itself(a in "[A-Za-z0-9_-]{1,256}") {
            prop_assert!(verify_secret(&secret(&a), &a));
        }
    }
}
