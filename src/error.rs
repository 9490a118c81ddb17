//! Error taxonomy.
//!
//! Provider-level failures (`ProviderError`) are classified by the
//! failover router and never cross the HTTP boundary raw; only
//! `RouteError` variants become responses. Upstream detail is logged for
//! diagnostics, not surfaced.

use thiserror::Error;

use crate::provider::ProviderId;

/// Failure of a single upstream provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure or timeout. Timeout expiry lands here so a hung
    /// upstream is indistinguishable from an unreachable one.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Non-2xx response with whatever body the upstream sent.
    #[error("upstream rejected request: HTTP {status}: {detail}")]
    UpstreamRejected { status: u16, detail: String },

    /// Non-JSON response, or JSON missing required fields. No partial
    /// parse is attempted.
    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),

    /// A previously valid session token was rejected (HTTP 401).
    /// The router re-authenticates once before treating this as hard.
    #[error("session token rejected by upstream")]
    AuthExpired,
}

impl ProviderError {
    /// Whether this failure should demote the provider in the health
    /// monitor. Auth expiry is a session problem, not a provider outage.
    pub fn is_demotable(&self) -> bool {
        !matches!(self, ProviderError::AuthExpired)
    }
}

/// Failure of a canonical operation, as seen by the HTTP layer.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid prefix {0:?}: must match ^[a-z0-9._-]{{3,30}}$")]
    InvalidPrefix(String),

    #[error("missing required parameter {0:?}")]
    MissingParam(&'static str),

    #[error("mailbox {0:?} already exists")]
    Conflict(String),

    /// Unknown prefix, or a mailbox past its (best-effort) expiry.
    #[error("no mailbox for prefix {0:?}")]
    NotFound(String),

    /// The process was started with an empty provider set.
    #[error("no inbox providers configured")]
    NoProvidersConfigured,

    /// Every candidate failed; carries the last error per attempted
    /// provider for diagnosability.
    #[error("all inbox providers unavailable")]
    AllProvidersUnavailable {
        attempts: Vec<(ProviderId, ProviderError)>,
    },
}
