//! 1secmail client.
//!
//! 1secmail needs no registration: an inbox is addressed by its
//! login+domain pair and every operation is a GET against one endpoint
//! with an `action` query parameter. Message ids are numeric on the wire
//! and stringified into the canonical opaque form.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use url::Url;

use super::{classify_send_error, read_json, ProviderClient, ProviderDescriptor, ProviderId};
use crate::error::ProviderError;
use crate::model::{Mailbox, Message};

/// Wire format of the `date` field, e.g. `2026-08-01 10:30:00` (UTC).
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct OneSecMailClient {
    http: reqwest::Client,
    descriptor: ProviderDescriptor,
    endpoint: String,
}

impl OneSecMailClient {
    pub fn new(http: reqwest::Client, base_url: Url, priority: u8) -> Self {
        let endpoint = base_url.to_string();
        Self {
            http,
            descriptor: ProviderDescriptor {
                provider_id: ProviderId::OneSecMail,
                base_url,
                auth_required: false,
                priority,
            },
            endpoint,
        }
    }

    async fn action<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(classify_send_error)?;
        read_json(response, false).await
    }

    /// First domain from `getDomainList`.
    async fn first_domain(&self) -> Result<String, ProviderError> {
        let domains: Vec<String> = self.action(&[("action", "getDomainList")]).await?;
        domains.into_iter().next().ok_or_else(|| {
            ProviderError::UpstreamMalformed("domain list is empty".to_string())
        })
    }
}

#[async_trait]
impl ProviderClient for OneSecMailClient {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn create_address(
        &self,
        prefix: Option<&str>,
        ttl: chrono::Duration,
    ) -> Result<Mailbox, ProviderError> {
        let (prefix, domain) = match prefix {
            // Any login works on 1secmail; only the domain comes from
            // upstream.
            Some(p) => (p.to_string(), self.first_domain().await?),
            None => {
                let generated: Vec<String> = self
                    .action(&[("action", "genRandomMailbox"), ("count", "1")])
                    .await?;
                let address = generated.into_iter().next().ok_or_else(|| {
                    ProviderError::UpstreamMalformed(
                        "genRandomMailbox returned no addresses".to_string(),
                    )
                })?;
                split_address(&address)?
            }
        };

        let now = Utc::now();
        Ok(Mailbox {
            upstream_address: format!("{prefix}@{domain}"),
            local_prefix: prefix,
            provider_id: ProviderId::OneSecMail,
            session_token: None,
            created_at: now,
            expires_at: now + ttl,
        })
    }

    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>, ProviderError> {
        let raw: Vec<SecSummary> = self
            .action(&[
                ("action", "getMessages"),
                ("login", &mailbox.local_prefix),
                ("domain", mailbox.domain()),
            ])
            .await?;
        raw.into_iter().map(normalize_summary).collect()
    }

    async fn fetch_message(
        &self,
        mailbox: &Mailbox,
        id: &str,
    ) -> Result<Message, ProviderError> {
        let raw: SecFull = self
            .action(&[
                ("action", "readMessage"),
                ("login", &mailbox.local_prefix),
                ("domain", mailbox.domain()),
                ("id", id),
            ])
            .await?;
        normalize_full(raw)
    }

    async fn reauthenticate(&self, _mailbox: &Mailbox) -> Result<Option<String>, ProviderError> {
        // No session to refresh.
        Ok(None)
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.first_domain().await.map(|_| ())
    }
}

/// Split `login@domain` into its halves.
fn split_address(address: &str) -> Result<(String, String), ProviderError> {
    address
        .split_once('@')
        .map(|(login, domain)| (login.to_string(), domain.to_string()))
        .ok_or_else(|| {
            ProviderError::UpstreamMalformed(format!("address {address:?} has no @"))
        })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SecSummary {
    id: i64,
    from: String,
    subject: String,
    date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecFull {
    id: i64,
    from: String,
    subject: String,
    date: String,
    #[serde(default)]
    text_body: Option<String>,
    #[serde(default)]
    html_body: Option<String>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProviderError::UpstreamMalformed(format!("bad date {raw:?}: {e}")))
}

fn normalize_summary(raw: SecSummary) -> Result<Message, ProviderError> {
    Ok(Message {
        id: raw.id.to_string(),
        from: raw.from,
        subject: raw.subject,
        received_at: parse_timestamp(&raw.date)?,
        body_fetched: false,
        body_text: None,
        body_html: None,
    })
}

fn normalize_full(raw: SecFull) -> Result<Message, ProviderError> {
    Ok(Message {
        id: raw.id.to_string(),
        from: raw.from,
        subject: raw.subject,
        received_at: parse_timestamp(&raw.date)?,
        body_fetched: true,
        body_text: raw.text_body.filter(|t| !t.is_empty()),
        body_html: raw.html_body.filter(|h| !h.is_empty()),
    })
}
