//! Provider health tracking.
//!
//! One record per configured provider, process-lifetime, owned
//! exclusively by the monitor. State machine per provider:
//! `Unknown → Healthy ⇄ Unhealthy`. Demotion happens on live upstream
//! failures (reported by the router) or a failed probe, and starts a
//! cooldown during which the provider is not retried. Promotion out of
//! `Unhealthy` happens only through an explicit probe after the cooldown
//! elapses — a single successful live call never flips the state, so an
//! intermittently recovering upstream can't flap.
//!
//! Probes are coalesced: concurrent callers for the same provider
//! serialize on a per-provider guard, and late arrivals observe the first
//! caller's result instead of issuing a duplicate liveness call.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::provider::{ProviderClient, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
struct HealthRecord {
    state: ProviderState,
    last_checked_at: Option<Instant>,
    /// Set iff `state == Unhealthy`.
    cooldown_until: Option<Instant>,
}

struct Entry {
    client: Arc<dyn ProviderClient>,
    /// Never held across an await.
    record: StdMutex<HealthRecord>,
    /// In-flight-probe guard; held across the probe call itself.
    probe_guard: AsyncMutex<()>,
}

/// Serializable view of one provider's health, for the `/api/health`
/// endpoint and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    pub provider_id: ProviderId,
    pub priority: u8,
    pub state: ProviderState,
    pub cooldown_remaining_secs: Option<f64>,
}

pub struct HealthMonitor {
    /// Ascending priority; this is the failover order.
    entries: Vec<Entry>,
    cooldown: Duration,
}

enum Admission {
    Admit,
    Skip,
    ProbeFirst,
}

impl HealthMonitor {
    pub fn new(clients: Vec<Arc<dyn ProviderClient>>, cooldown: Duration) -> Self {
        let mut entries: Vec<Entry> = clients
            .into_iter()
            .map(|client| Entry {
                client,
                record: StdMutex::new(HealthRecord {
                    state: ProviderState::Unknown,
                    last_checked_at: None,
                    cooldown_until: None,
                }),
                probe_guard: AsyncMutex::new(()),
            })
            .collect();
        entries.sort_by_key(|e| e.client.descriptor().priority);
        Self { entries, cooldown }
    }

    fn entry(&self, id: ProviderId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.client.id() == id)
    }

    /// Demote a provider after a live upstream failure and start its
    /// cooldown.
    pub fn record_failure(&self, id: ProviderId) {
        let Some(entry) = self.entry(id) else { return };
        let mut record = entry.record.lock().unwrap();
        let now = Instant::now();
        record.state = ProviderState::Unhealthy;
        record.last_checked_at = Some(now);
        record.cooldown_until = Some(now + self.cooldown);
        tracing::warn!(
            provider = %id,
            cooldown_secs = self.cooldown.as_secs_f64(),
            "Provider demoted to unhealthy"
        );
    }

    /// Note a successful live call. `Unknown` becomes `Healthy`;
    /// `Unhealthy` is left alone — only a probe promotes.
    pub fn record_success(&self, id: ProviderId) {
        let Some(entry) = self.entry(id) else { return };
        let mut record = entry.record.lock().unwrap();
        if record.state == ProviderState::Unknown {
            record.state = ProviderState::Healthy;
        }
    }

    pub fn state(&self, id: ProviderId) -> Option<ProviderState> {
        self.entry(id).map(|e| e.record.lock().unwrap().state)
    }

    /// Providers admissible for a request, in ascending priority.
    ///
    /// Unhealthy providers mid-cooldown are filtered out; ones whose
    /// cooldown has elapsed get a (coalesced) probe and are admitted only
    /// if it succeeds. If nothing is admissible the full ordered list is
    /// returned anyway — routing attempts a last resort rather than
    /// failing closed.
    pub async fn select_candidates(&self) -> Vec<ProviderId> {
        self.select_among(None).await
    }

    /// Same admission rules restricted to one provider, for operations
    /// bound to the mailbox's owning provider.
    pub async fn select_for(&self, id: ProviderId) -> Vec<ProviderId> {
        self.select_among(Some(id)).await
    }

    async fn select_among(&self, restrict: Option<ProviderId>) -> Vec<ProviderId> {
        let mut admitted = Vec::new();
        let mut considered = Vec::new();

        for entry in &self.entries {
            let id = entry.client.id();
            if restrict.is_some_and(|r| r != id) {
                continue;
            }
            considered.push(id);

            let admission = {
                let record = entry.record.lock().unwrap();
                match record.state {
                    ProviderState::Unknown | ProviderState::Healthy => Admission::Admit,
                    ProviderState::Unhealthy => {
                        let cooling = record
                            .cooldown_until
                            .is_some_and(|until| Instant::now() < until);
                        if cooling {
                            Admission::Skip
                        } else {
                            Admission::ProbeFirst
                        }
                    }
                }
            };

            match admission {
                Admission::Admit => admitted.push(id),
                Admission::Skip => {}
                Admission::ProbeFirst => {
                    if self.probe_entry(entry).await {
                        admitted.push(id);
                    }
                }
            }
        }

        if admitted.is_empty() && !considered.is_empty() {
            tracing::warn!("All candidate providers unhealthy; failing open with full list");
            return considered;
        }
        admitted
    }

    /// Run the provider's liveness call under the in-flight guard.
    ///
    /// Returns whether the provider ended up healthy. A caller that loses
    /// the race re-checks under the guard and observes the winner's
    /// outcome (fresh cooldown or promotion) without a second outbound
    /// call.
    async fn probe_entry(&self, entry: &Entry) -> bool {
        let _guard = entry.probe_guard.lock().await;

        {
            let record = entry.record.lock().unwrap();
            match record.state {
                ProviderState::Unknown | ProviderState::Healthy => return true,
                ProviderState::Unhealthy => {
                    if record
                        .cooldown_until
                        .is_some_and(|until| Instant::now() < until)
                    {
                        return false;
                    }
                }
            }
        }

        let id = entry.client.id();
        let result = entry.client.probe().await;

        let mut record = entry.record.lock().unwrap();
        let now = Instant::now();
        record.last_checked_at = Some(now);
        match result {
            Ok(()) => {
                record.state = ProviderState::Healthy;
                record.cooldown_until = None;
                tracing::info!(provider = %id, "Probe succeeded; provider promoted");
                true
            }
            Err(e) => {
                record.state = ProviderState::Unhealthy;
                record.cooldown_until = Some(now + self.cooldown);
                tracing::warn!(provider = %id, error = %e, "Probe failed; cooldown restarted");
                false
            }
        }
    }

    pub fn snapshot(&self) -> Vec<ProviderHealthSnapshot> {
        self.entries
            .iter()
            .map(|entry| {
                let record = entry.record.lock().unwrap();
                let remaining = record.cooldown_until.and_then(|until| {
                    let now = Instant::now();
                    (now < until).then(|| (until - now).as_secs_f64())
                });
                ProviderHealthSnapshot {
                    provider_id: entry.client.id(),
                    priority: entry.client.descriptor().priority,
                    state: record.state,
                    cooldown_remaining_secs: remaining,
                }
            })
            .collect()
    }
}
