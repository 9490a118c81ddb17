//! mail.tm client.
//!
//! mail.tm requires a registered account per mailbox: creation is a
//! two-call register-then-login exchange (`POST /accounts`, then
//! `POST /token`) yielding a bearer token for all inbox polling. List
//! responses are JSON-LD with a `hydra:member` envelope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{classify_send_error, read_json, ProviderClient, ProviderDescriptor, ProviderId};
use crate::error::ProviderError;
use crate::model::{random_prefix, Mailbox, Message};

pub struct MailTmClient {
    http: reqwest::Client,
    descriptor: ProviderDescriptor,
    /// Base URL as a string with a guaranteed trailing slash.
    base: String,
    /// Per-process account password. Mailboxes don't survive a restart,
    /// so the password only has to be stable for this process lifetime.
    password: String,
}

impl MailTmClient {
    pub fn new(http: reqwest::Client, base_url: Url, priority: u8) -> Self {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            http,
            descriptor: ProviderDescriptor {
                provider_id: ProviderId::MailTm,
                base_url,
                auth_required: true,
                priority,
            },
            base,
            password: format!("{}{}", random_prefix(), random_prefix()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// First advertised domain from `GET /domains`.
    async fn first_domain(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(self.url("domains"))
            .send()
            .await
            .map_err(classify_send_error)?;
        let domains: HydraList<TmDomain> = read_json(response, false).await?;
        domains
            .member
            .into_iter()
            .next()
            .map(|d| d.domain)
            .ok_or_else(|| {
                ProviderError::UpstreamMalformed("domain list is empty".to_string())
            })
    }

    /// `POST /token` with address + password, returning the bearer token.
    async fn login(&self, address: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.url("token"))
            .json(&json!({ "address": address, "password": self.password }))
            .send()
            .await
            .map_err(classify_send_error)?;
        let token: TmToken = read_json(response, false).await?;
        Ok(token.token)
    }

    fn bearer(mailbox: &Mailbox) -> Result<&str, ProviderError> {
        // A missing token on an auth-required provider is handled like a
        // rejected one: the router re-authenticates once.
        mailbox
            .session_token
            .as_deref()
            .ok_or(ProviderError::AuthExpired)
    }
}

#[async_trait]
impl ProviderClient for MailTmClient {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn create_address(
        &self,
        prefix: Option<&str>,
        ttl: chrono::Duration,
    ) -> Result<Mailbox, ProviderError> {
        let domain = self.first_domain().await?;
        let prefix = prefix.map(str::to_string).unwrap_or_else(random_prefix);
        let address = format!("{prefix}@{domain}");

        let response = self
            .http
            .post(self.url("accounts"))
            .json(&json!({ "address": address, "password": self.password }))
            .send()
            .await
            .map_err(classify_send_error)?;
        let _account: TmAccount = read_json(response, false).await?;

        let token = self.login(&address).await?;

        let now = Utc::now();
        Ok(Mailbox {
            local_prefix: prefix,
            upstream_address: address,
            provider_id: ProviderId::MailTm,
            session_token: Some(token),
            created_at: now,
            expires_at: now + ttl,
        })
    }

    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>, ProviderError> {
        let response = self
            .http
            .get(self.url("messages"))
            .bearer_auth(Self::bearer(mailbox)?)
            .send()
            .await
            .map_err(classify_send_error)?;
        let list: HydraList<TmMessageSummary> = read_json(response, true).await?;
        list.member.into_iter().map(normalize_summary).collect()
    }

    async fn fetch_message(
        &self,
        mailbox: &Mailbox,
        id: &str,
    ) -> Result<Message, ProviderError> {
        let response = self
            .http
            .get(self.url(&format!("messages/{id}")))
            .bearer_auth(Self::bearer(mailbox)?)
            .send()
            .await
            .map_err(classify_send_error)?;
        let full: TmMessageFull = read_json(response, true).await?;
        normalize_full(full)
    }

    async fn reauthenticate(&self, mailbox: &Mailbox) -> Result<Option<String>, ProviderError> {
        self.login(&mailbox.upstream_address).await.map(Some)
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.first_domain().await.map(|_| ())
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HydraList<T> {
    #[serde(rename = "hydra:member")]
    member: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmDomain {
    domain: String,
}

#[derive(Debug, Deserialize)]
struct TmToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TmAccount {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct TmFrom {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmMessageSummary {
    id: String,
    from: TmFrom,
    subject: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TmMessageFull {
    id: String,
    from: TmFrom,
    subject: String,
    created_at: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    html: Option<Vec<String>>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProviderError::UpstreamMalformed(format!("bad createdAt {raw:?}: {e}")))
}

fn normalize_summary(raw: TmMessageSummary) -> Result<Message, ProviderError> {
    Ok(Message {
        id: raw.id,
        from: raw.from.address,
        subject: raw.subject,
        received_at: parse_timestamp(&raw.created_at)?,
        body_fetched: false,
        body_text: None,
        body_html: None,
    })
}

fn normalize_full(raw: TmMessageFull) -> Result<Message, ProviderError> {
    let received_at = parse_timestamp(&raw.created_at)?;
    let body_html = raw
        .html
        .map(|parts| parts.join("\n"))
        .filter(|h| !h.is_empty());
    Ok(Message {
        id: raw.id,
        from: raw.from.address,
        subject: raw.subject,
        received_at,
        body_fetched: true,
        body_text: raw.text,
        body_html,
    })
}
