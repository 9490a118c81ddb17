//! In-memory mailbox store.
//!
//! Maps a local prefix to its upstream credentials and session state.
//! Nothing is persisted: every mailbox dies with the process, and expiry
//! is best-effort — an expired entry is evicted lazily on the next read,
//! never by a background sweep.
//!
//! Critical sections are plain map operations; no lock is ever held
//! across upstream I/O, so creation of distinct prefixes never waits on
//! another prefix's upstream call.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::RouteError;
use crate::model::Mailbox;

#[derive(Default)]
pub struct AccountStore {
    mailboxes: RwLock<HashMap<String, Mailbox>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mailbox under its prefix.
    ///
    /// Fails with `Conflict` if a live (non-expired) mailbox already
    /// holds the prefix. An expired holdover is evicted and replaced.
    pub async fn put(&self, mailbox: Mailbox) -> Result<(), RouteError> {
        let mut mailboxes = self.mailboxes.write().await;
        if let Some(existing) = mailboxes.get(&mailbox.local_prefix) {
            if !existing.is_expired(Utc::now()) {
                return Err(RouteError::Conflict(mailbox.local_prefix));
            }
        }
        mailboxes.insert(mailbox.local_prefix.clone(), mailbox);
        Ok(())
    }

    /// Look up a mailbox, lazily evicting it if it has expired.
    pub async fn get(&self, prefix: &str) -> Option<Mailbox> {
        {
            let mailboxes = self.mailboxes.read().await;
            match mailboxes.get(prefix) {
                Some(mailbox) if !mailbox.is_expired(Utc::now()) => {
                    return Some(mailbox.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: escalate to a write lock and re-check before evicting.
        let mut mailboxes = self.mailboxes.write().await;
        if mailboxes
            .get(prefix)
            .is_some_and(|m| m.is_expired(Utc::now()))
        {
            mailboxes.remove(prefix);
            tracing::debug!(prefix = %prefix, "Evicted expired mailbox");
        }
        None
    }

    /// Whether a live mailbox holds `prefix`. Does not evict.
    pub async fn contains(&self, prefix: &str) -> bool {
        self.mailboxes
            .read()
            .await
            .get(prefix)
            .is_some_and(|m| !m.is_expired(Utc::now()))
    }

    /// Push a mailbox's expiry out by `ttl` from now. No-op on unknown
    /// prefixes.
    pub async fn touch(&self, prefix: &str, ttl: chrono::Duration) {
        let mut mailboxes = self.mailboxes.write().await;
        if let Some(mailbox) = mailboxes.get_mut(prefix) {
            mailbox.expires_at = Utc::now() + ttl;
        }
    }

    /// Replace the session token after a re-authentication. The only
    /// mutation a mailbox sees after creation.
    pub async fn refresh_session(&self, prefix: &str, token: Option<String>) {
        let mut mailboxes = self.mailboxes.write().await;
        if let Some(mailbox) = mailboxes.get_mut(prefix) {
            mailbox.session_token = token;
        }
    }
}
