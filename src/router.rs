//! Failover routing for the three canonical operations.
//!
//! Each operation walks an ordered candidate list from the health
//! monitor and runs a uniform try/classify/continue loop per candidate:
//! first success wins, upstream failures demote the provider and move on
//! to the next one, and `AuthExpired` gets exactly one re-authentication
//! retry before counting as a hard failure. Candidates are always tried
//! in ascending priority — routing is deterministic for a given health
//! snapshot.
//!
//! Address creation fails over across all providers. Inbox operations
//! are bound to the provider that owns the mailbox (its messages exist
//! nowhere else), so their candidate list is that single provider run
//! through the same admission rules.

use std::sync::Arc;

use serde::Serialize;

use crate::account::AccountStore;
use crate::error::{ProviderError, RouteError};
use crate::health::HealthMonitor;
use crate::model::{is_valid_prefix, Mailbox, Message};
use crate::provider::{ProviderClient, ProviderId};

/// Result of `createAddress`, as returned to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAddress {
    pub prefix: String,
    pub domain: String,
}

pub struct FailoverRouter {
    /// Ascending priority.
    clients: Vec<Arc<dyn ProviderClient>>,
    monitor: Arc<HealthMonitor>,
    store: AccountStore,
    mailbox_ttl: chrono::Duration,
}

enum BoundOp<'a> {
    List,
    Fetch(&'a str),
}

enum BoundOut {
    List(Vec<Message>),
    Fetch(Message),
}

impl FailoverRouter {
    pub fn new(
        clients: Vec<Arc<dyn ProviderClient>>,
        monitor: Arc<HealthMonitor>,
        store: AccountStore,
        mailbox_ttl: chrono::Duration,
    ) -> Self {
        let mut clients = clients;
        clients.sort_by_key(|c| c.descriptor().priority);
        Self {
            clients,
            monitor,
            store,
            mailbox_ttl,
        }
    }

    fn client(&self, id: ProviderId) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.iter().find(|c| c.id() == id)
    }

    /// Provision a disposable address, failing over across providers.
    ///
    /// Validation and the duplicate check run before any upstream call.
    pub async fn create_address(
        &self,
        requested: Option<&str>,
    ) -> Result<GeneratedAddress, RouteError> {
        if self.clients.is_empty() {
            return Err(RouteError::NoProvidersConfigured);
        }
        if let Some(prefix) = requested {
            if !is_valid_prefix(prefix) {
                return Err(RouteError::InvalidPrefix(prefix.to_string()));
            }
            if self.store.contains(prefix).await {
                return Err(RouteError::Conflict(prefix.to_string()));
            }
        }

        let candidates = self.monitor.select_candidates().await;
        let mut attempts = Vec::new();
        for id in candidates {
            let Some(client) = self.client(id) else {
                continue;
            };
            match client.create_address(requested, self.mailbox_ttl).await {
                Ok(mailbox) => {
                    self.monitor.record_success(id);
                    let generated = GeneratedAddress {
                        prefix: mailbox.local_prefix.clone(),
                        domain: mailbox.domain().to_string(),
                    };
                    // A racing creation of the same prefix may have won
                    // between the pre-check and here.
                    self.store.put(mailbox).await?;
                    tracing::info!(
                        provider = %id,
                        prefix = %generated.prefix,
                        "Mailbox provisioned"
                    );
                    return Ok(generated);
                }
                Err(e) => self.note_failure(id, e, &mut attempts),
            }
        }
        Err(RouteError::AllProvidersUnavailable { attempts })
    }

    /// List a mailbox's inbox in canonical shape.
    pub async fn list_messages(&self, prefix: &str) -> Result<Vec<Message>, RouteError> {
        let mailbox = self.lookup(prefix).await?;
        match self.run_bound(&mailbox, BoundOp::List).await? {
            BoundOut::List(messages) => {
                // Active polling keeps the inbox alive.
                self.store.touch(prefix, self.mailbox_ttl).await;
                Ok(messages)
            }
            BoundOut::Fetch(_) => unreachable!("list op returned fetch result"),
        }
    }

    /// Fetch one message, body included.
    pub async fn fetch_message(&self, prefix: &str, id: &str) -> Result<Message, RouteError> {
        let mailbox = self.lookup(prefix).await?;
        match self.run_bound(&mailbox, BoundOp::Fetch(id)).await? {
            BoundOut::Fetch(message) => {
                self.store.touch(prefix, self.mailbox_ttl).await;
                Ok(message)
            }
            BoundOut::List(_) => unreachable!("fetch op returned list result"),
        }
    }

    /// Current provider health, for the diagnostics endpoint.
    pub fn health_snapshot(&self) -> Vec<crate::health::ProviderHealthSnapshot> {
        self.monitor.snapshot()
    }

    async fn lookup(&self, prefix: &str) -> Result<Mailbox, RouteError> {
        if !is_valid_prefix(prefix) {
            return Err(RouteError::InvalidPrefix(prefix.to_string()));
        }
        self.store
            .get(prefix)
            .await
            .ok_or_else(|| RouteError::NotFound(prefix.to_string()))
    }

    async fn run_bound(
        &self,
        mailbox: &Mailbox,
        op: BoundOp<'_>,
    ) -> Result<BoundOut, RouteError> {
        let candidates = self.monitor.select_for(mailbox.provider_id).await;
        let mut mailbox = mailbox.clone();
        let mut attempts = Vec::new();
        for id in candidates {
            let Some(client) = self.client(id) else {
                continue;
            };
            match self
                .attempt_with_reauth(client.as_ref(), &mut mailbox, &op)
                .await
            {
                Ok(out) => {
                    self.monitor.record_success(id);
                    return Ok(out);
                }
                Err(e) => self.note_failure(id, e, &mut attempts),
            }
        }
        Err(RouteError::AllProvidersUnavailable { attempts })
    }

    /// One provider attempt, with the single re-authentication retry on
    /// `AuthExpired`.
    async fn attempt_with_reauth(
        &self,
        client: &dyn ProviderClient,
        mailbox: &mut Mailbox,
        op: &BoundOp<'_>,
    ) -> Result<BoundOut, ProviderError> {
        match Self::invoke(client, mailbox, op).await {
            Err(ProviderError::AuthExpired) => {
                tracing::info!(
                    provider = %client.id(),
                    prefix = %mailbox.local_prefix,
                    "Session token rejected; re-authenticating once"
                );
                let token = client.reauthenticate(mailbox).await?;
                mailbox.session_token = token.clone();
                self.store
                    .refresh_session(&mailbox.local_prefix, token)
                    .await;
                Self::invoke(client, mailbox, op).await
            }
            other => other,
        }
    }

    async fn invoke(
        client: &dyn ProviderClient,
        mailbox: &Mailbox,
        op: &BoundOp<'_>,
    ) -> Result<BoundOut, ProviderError> {
        match op {
            BoundOp::List => client.list_messages(mailbox).await.map(BoundOut::List),
            BoundOp::Fetch(id) => client.fetch_message(mailbox, id).await.map(BoundOut::Fetch),
        }
    }

    fn note_failure(
        &self,
        id: ProviderId,
        error: ProviderError,
        attempts: &mut Vec<(ProviderId, ProviderError)>,
    ) {
        if error.is_demotable() {
            self.monitor.record_failure(id);
        }
        tracing::warn!(
            provider = %id,
            error = %error,
            "Provider call failed; trying next candidate"
        );
        attempts.push((id, error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProviderState;
    use crate::provider::mock::{MockProvider, Script};
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Fixture {
        router: FailoverRouter,
        monitor: Arc<HealthMonitor>,
        a: Arc<MockProvider>,
        b: Arc<MockProvider>,
    }

    fn fixture() -> Fixture {
        let a = Arc::new(MockProvider::new(ProviderId::MockA, 0, true));
        let b = Arc::new(MockProvider::new(ProviderId::MockB, 1, false));
        let clients: Vec<Arc<dyn ProviderClient>> = vec![a.clone(), b.clone()];
        let monitor = Arc::new(HealthMonitor::new(
            clients.clone(),
            Duration::from_secs(60),
        ));
        let router = FailoverRouter::new(
            clients,
            monitor.clone(),
            AccountStore::new(),
            chrono::Duration::minutes(10),
        );
        Fixture {
            router,
            monitor,
            a,
            b,
        }
    }

    fn canned_message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            from: "sender@example.com".to_string(),
            subject: "hello".to_string(),
            received_at: Utc::now(),
            body_fetched: false,
            body_text: Some("body".to_string()),
            body_html: None,
        }
    }

    #[tokio::test]
    async fn create_then_list_is_empty_never_not_found() {
        let f = fixture();
        let generated = f.router.create_address(Some("abc123")).await.unwrap();
        assert_eq!(generated.prefix, "abc123");
        assert_eq!(generated.domain, "mock-a.test");
        let inbox = f.router.list_messages("abc123").await.unwrap();
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn invalid_prefix_issues_zero_upstream_calls() {
        let f = fixture();
        for bad in ["ab", "x".repeat(31).as_str(), "user@host", "Has Space"] {
            let err = f.router.create_address(Some(bad)).await.unwrap_err();
            assert!(matches!(err, RouteError::InvalidPrefix(_)));
        }
        assert_eq!(f.a.op_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.b.op_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_prefix_conflicts_before_upstream() {
        let f = fixture();
        f.router.create_address(Some("abc123")).await.unwrap();
        let calls_after_first = f.a.op_calls.load(Ordering::SeqCst);
        let err = f.router.create_address(Some("abc123")).await.unwrap_err();
        assert!(matches!(err, RouteError::Conflict(_)));
        assert_eq!(f.a.op_calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn unreachable_preferred_provider_fails_over() {
        let f = fixture();
        f.a.set_script(Script::Unreachable);
        let generated = f.router.create_address(Some("abc123")).await.unwrap();
        assert_eq!(generated.domain, "mock-b.test");
        assert_eq!(
            f.monitor.state(ProviderId::MockA),
            Some(ProviderState::Unhealthy)
        );
    }

    #[tokio::test]
    async fn malformed_upstream_demotes_and_fails_over() {
        let f = fixture();
        f.a.set_script(Script::Malformed);
        let generated = f.router.create_address(None).await.unwrap();
        assert_eq!(generated.domain, "mock-b.test");
        assert_eq!(
            f.monitor.state(ProviderId::MockA),
            Some(ProviderState::Unhealthy)
        );
    }

    #[tokio::test]
    async fn all_providers_failing_yields_aggregate_error() {
        let f = fixture();
        f.a.set_script(Script::Unreachable);
        f.b.set_script(Script::Rejected);
        let err = f.router.create_address(None).await.unwrap_err();
        match err {
            RouteError::AllProvidersUnavailable { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, ProviderId::MockA);
                assert_eq!(attempts[1].0, ProviderId::MockB);
            }
            other => panic!("expected AllProvidersUnavailable, got {other:?}"),
        }
        for id in [ProviderId::MockA, ProviderId::MockB] {
            assert_eq!(f.monitor.state(id), Some(ProviderState::Unhealthy));
        }
        let snapshot = f.monitor.snapshot();
        assert!(snapshot
            .iter()
            .all(|s| s.cooldown_remaining_secs.unwrap() > 0.0));
    }

    #[tokio::test]
    async fn unhealthy_provider_is_not_invoked() {
        let f = fixture();
        f.monitor.record_failure(ProviderId::MockA);
        let generated = f.router.create_address(Some("abc123")).await.unwrap();
        assert_eq!(generated.domain, "mock-b.test");
        assert_eq!(f.a.op_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.a.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_gets_exactly_one_reauth_retry() {
        let f = fixture();
        f.router.create_address(Some("abc123")).await.unwrap();
        let calls_before = f.a.op_calls.load(Ordering::SeqCst);

        f.a.set_script(Script::AuthExpired);
        f.a.heal_on_reauth();
        f.a.push_message(canned_message("1"));

        let inbox = f.router.list_messages("abc123").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(f.a.reauth_calls.load(Ordering::SeqCst), 1);
        // One failed list + one retried list.
        assert_eq!(f.a.op_calls.load(Ordering::SeqCst), calls_before + 2);
    }

    #[tokio::test]
    async fn persistent_auth_failure_is_hard_but_does_not_demote() {
        let f = fixture();
        f.router.create_address(Some("abc123")).await.unwrap();
        f.a.set_script(Script::AuthExpired);

        let err = f.router.list_messages("abc123").await.unwrap_err();
        assert!(matches!(err, RouteError::AllProvidersUnavailable { .. }));
        assert_eq!(f.a.reauth_calls.load(Ordering::SeqCst), 1);
        // A session problem is not a provider outage.
        assert_ne!(
            f.monitor.state(ProviderId::MockA),
            Some(ProviderState::Unhealthy)
        );
    }

    #[tokio::test]
    async fn list_unknown_prefix_is_not_found() {
        let f = fixture();
        let err = f.router.list_messages("nosuchbox").await.unwrap_err();
        assert!(matches!(err, RouteError::NotFound(_)));
        assert_eq!(f.a.op_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_returns_full_body() {
        let f = fixture();
        f.router.create_address(Some("abc123")).await.unwrap();
        f.a.push_message(canned_message("msg-7"));
        let message = f.router.fetch_message("abc123", "msg-7").await.unwrap();
        assert!(message.body_fetched);
        assert_eq!(message.id, "msg-7");
    }

    #[tokio::test]
    async fn bound_op_does_not_fail_over_to_other_provider() {
        let f = fixture();
        f.router.create_address(Some("abc123")).await.unwrap();
        f.a.set_script(Script::Unreachable);
        f.b.push_message(canned_message("1"));

        let err = f.router.list_messages("abc123").await.unwrap_err();
        assert!(matches!(err, RouteError::AllProvidersUnavailable { .. }));
        // The mailbox lives on A; B must never be asked for its inbox.
        assert_eq!(f.b.op_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_providers_configured() {
        let monitor = Arc::new(HealthMonitor::new(vec![], Duration::from_secs(60)));
        let router = FailoverRouter::new(
            vec![],
            monitor,
            AccountStore::new(),
            chrono::Duration::minutes(10),
        );
        let err = router.create_address(None).await.unwrap_err();
        assert!(matches!(err, RouteError::NoProvidersConfigured));
    }
}
