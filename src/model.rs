//! Canonical data model shared by the provider clients, the account store
//! and the HTTP layer.
//!
//! Every provider speaks its own JSON dialect; the clients normalize into
//! these shapes (field name and unit translation only). Message `id`s are
//! opaque strings — they are numeric on some upstreams and hashes on
//! others, and must never be compared across providers.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::provider::ProviderId;

/// Accepted local-part pattern: lowercase letters, digits, dot,
/// underscore, hyphen, 3–30 characters.
const PREFIX_PATTERN: &str = r"^[a-z0-9._-]{3,30}$";

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PREFIX_PATTERN).expect("prefix pattern is valid"))
}

/// Whether `prefix` is an acceptable local mailbox prefix.
///
/// Enforced before any upstream call is made.
pub fn is_valid_prefix(prefix: &str) -> bool {
    prefix_regex().is_match(prefix)
}

/// Generate a random 8-character prefix from the accepted alphabet.
pub fn random_prefix() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// A locally tracked disposable mailbox and its upstream session.
///
/// Lives only in process memory; destroyed on expiry or restart. The
/// `session_token` is present iff the owning provider requires
/// authenticated polling, and is refreshed only by re-authentication.
#[derive(Debug, Clone)]
pub struct Mailbox {
    /// Local part of the address, validated against [`is_valid_prefix`].
    pub local_prefix: String,
    /// Full upstream address, `<prefix>@<domain>`.
    pub upstream_address: String,
    /// Provider that owns this mailbox.
    pub provider_id: ProviderId,
    /// Bearer token for authenticated providers, `None` otherwise.
    pub session_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Mailbox {
    /// Domain part of the upstream address.
    pub fn domain(&self) -> &str {
        self.upstream_address
            .split_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or(&self.upstream_address)
    }

    /// Whether the mailbox has passed its expiry time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Provider-agnostic message representation returned to callers.
///
/// Listing an inbox yields entries with `body_fetched == false` and no
/// bodies; fetching a single message fills them in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque upstream identifier, unique only within one provider.
    pub id: String,
    pub from: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub body_fetched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
}
