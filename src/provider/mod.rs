//! Upstream provider abstraction.
//!
//! Each transient-email provider speaks a different wire format and auth
//! scheme; a [`ProviderClient`] translates the three canonical operations
//! (create address, list messages, fetch message) into one provider's
//! HTTP calls and normalizes the responses. The failover router only ever
//! talks to this trait.

pub mod mail_tm;
pub mod one_sec_mail;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::ProviderError;
use crate::model::{Mailbox, Message};

/// Identifier of a configured upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    MailTm,
    OneSecMail,
    /// Only constructed by tests.
    #[cfg(test)]
    MockA,
    #[cfg(test)]
    MockB,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MailTm => write!(f, "mail.tm"),
            Self::OneSecMail => write!(f, "1secmail"),
            #[cfg(test)]
            Self::MockA => write!(f, "mock-a"),
            #[cfg(test)]
            Self::MockB => write!(f, "mock-b"),
        }
    }
}

/// Static configuration for one provider. Immutable after process start;
/// the failover order is ascending `priority`.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub provider_id: ProviderId,
    pub base_url: Url,
    /// Whether polling requires a session token (register-then-login
    /// exchange on mailbox creation).
    pub auth_required: bool,
    pub priority: u8,
}

/// One upstream transient-email backend.
///
/// Implementations normalize field names and units only — no semantic
/// reinterpretation of upstream data.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn id(&self) -> ProviderId {
        self.descriptor().provider_id
    }

    /// Provision a mailbox, using `prefix` if given or a provider-chosen
    /// random one otherwise. `ttl` sets the local expiry window.
    async fn create_address(
        &self,
        prefix: Option<&str>,
        ttl: chrono::Duration,
    ) -> Result<Mailbox, ProviderError>;

    /// List the inbox. Returned messages have `body_fetched == false`.
    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>, ProviderError>;

    /// Fetch one message including its body.
    async fn fetch_message(&self, mailbox: &Mailbox, id: &str)
        -> Result<Message, ProviderError>;

    /// Re-run the provider's auth exchange for an existing mailbox,
    /// returning the fresh session token (`None` for unauthenticated
    /// providers, which have nothing to refresh).
    async fn reauthenticate(&self, mailbox: &Mailbox) -> Result<Option<String>, ProviderError>;

    /// Cheap liveness call used by the health monitor. Must not mutate
    /// any upstream state.
    async fn probe(&self) -> Result<(), ProviderError>;
}

/// Classify a reqwest transport error. Timeouts and connection failures
/// are both `UpstreamUnreachable` — a hung upstream is treated the same
/// as a dead one.
pub(crate) fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::UpstreamUnreachable(format!("request timeout: {err}"))
    } else if err.is_connect() {
        ProviderError::UpstreamUnreachable(format!("connection failed: {err}"))
    } else {
        ProviderError::UpstreamUnreachable(format!("request failed: {err}"))
    }
}

/// Read and strictly parse a JSON response body.
///
/// `authenticated` marks calls made with a session token: a 401 on those
/// is `AuthExpired` (triggers the router's single re-auth retry) rather
/// than a plain rejection.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    authenticated: bool,
) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::UpstreamUnreachable(format!("reading response body: {e}")))?;

    if authenticated && status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::AuthExpired);
    }
    if !status.is_success() {
        return Err(ProviderError::UpstreamRejected {
            status: status.as_u16(),
            detail: truncate(&body, 200),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::UpstreamMalformed(format!("{e} (body: {})", truncate(&body, 120))))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
