//! Scripted in-memory provider for router and health-monitor tests.
//!
//! Carries atomic call counters so tests can assert exactly how many
//! upstream calls an operation issued.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use super::{ProviderClient, ProviderDescriptor, ProviderId};
use crate::error::ProviderError;
use crate::model::{Mailbox, Message};

/// What the next operation calls should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Ok,
    Unreachable,
    Rejected,
    Malformed,
    AuthExpired,
}

pub struct MockProvider {
    descriptor: ProviderDescriptor,
    script: Mutex<Script>,
    probe_ok: AtomicBool,
    probe_delay: Mutex<Option<Duration>>,
    /// Whether a successful reauthentication resets the script to `Ok`
    /// (models an upstream that only rejected a stale token).
    reauth_heals: AtomicBool,
    messages: Mutex<Vec<Message>>,
    pub op_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub reauth_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(provider_id: ProviderId, priority: u8, auth_required: bool) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                provider_id,
                base_url: Url::parse("http://mock.invalid/").unwrap(),
                auth_required,
                priority,
            },
            script: Mutex::new(Script::Ok),
            probe_ok: AtomicBool::new(true),
            probe_delay: Mutex::new(None),
            reauth_heals: AtomicBool::new(false),
            messages: Mutex::new(Vec::new()),
            op_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            reauth_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = Some(delay);
    }

    pub fn heal_on_reauth(&self) {
        self.reauth_heals.store(true, Ordering::SeqCst);
    }

    pub fn push_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn domain(&self) -> String {
        format!("{}.test", self.descriptor.provider_id)
    }

    fn scripted_failure(&self) -> Option<ProviderError> {
        match *self.script.lock().unwrap() {
            Script::Ok => None,
            Script::Unreachable => Some(ProviderError::UpstreamUnreachable(
                "simulated timeout".to_string(),
            )),
            Script::Rejected => Some(ProviderError::UpstreamRejected {
                status: 503,
                detail: "simulated outage".to_string(),
            }),
            Script::Malformed => Some(ProviderError::UpstreamMalformed(
                "simulated garbage body".to_string(),
            )),
            Script::AuthExpired => Some(ProviderError::AuthExpired),
        }
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn create_address(
        &self,
        prefix: Option<&str>,
        ttl: chrono::Duration,
    ) -> Result<Mailbox, ProviderError> {
        self.op_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let prefix = prefix.unwrap_or("generated1").to_string();
        let now = Utc::now();
        Ok(Mailbox {
            upstream_address: format!("{prefix}@{}", self.domain()),
            local_prefix: prefix,
            provider_id: self.descriptor.provider_id,
            session_token: self
                .descriptor
                .auth_required
                .then(|| "mock-token".to_string()),
            created_at: now,
            expires_at: now + ttl,
        })
    }

    async fn list_messages(&self, _mailbox: &Mailbox) -> Result<Vec<Message>, ProviderError> {
        self.op_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn fetch_message(
        &self,
        _mailbox: &Mailbox,
        id: &str,
    ) -> Result<Message, ProviderError> {
        self.op_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .map(|mut m| {
                m.body_fetched = true;
                m
            })
            .ok_or(ProviderError::UpstreamRejected {
                status: 404,
                detail: "no such message".to_string(),
            })
    }

    async fn reauthenticate(&self, _mailbox: &Mailbox) -> Result<Option<String>, ProviderError> {
        self.reauth_calls.fetch_add(1, Ordering::SeqCst);
        if self.reauth_heals.load(Ordering::SeqCst) {
            self.set_script(Script::Ok);
        }
        Ok(Some("fresh-token".to_string()))
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::UpstreamUnreachable(
                "simulated probe failure".to_string(),
            ))
        }
    }
}
