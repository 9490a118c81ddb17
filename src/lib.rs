//! # MailDropHQ Backend
//!
//! Disposable-email backend that proxies third-party transient-mail
//! providers and fails over between them automatically.
//!
//! ```text
//!   GET /api/generate ──┐
//!   GET /api/messages ──┼──▶ FailoverRouter ──▶ HealthMonitor
//!   GET /api/message  ──┘          │                  │
//!                                  ▼                  ▼
//!                           ProviderClient      cooldown + probes
//!                          (mail.tm, 1secmail)
//! ```
//!
//! A request walks the health monitor's ordered candidate list; the first
//! healthy provider serves it, failures demote the provider into a
//! cooldown and the next candidate is tried. Each provider's wire format
//! is normalized into one canonical message/mailbox shape.
//!
//! All mailbox state lives in process memory and is lost on restart —
//! that is a documented property of the service, not a defect.
//!
//! ## Modules
//! - `provider`: the upstream abstraction and one client per provider
//! - `health`: per-provider health records, cooldowns, coalesced probes
//! - `router`: the failover waterfall over the three canonical operations
//! - `account`: in-memory mailbox store with lazy expiry
//! - `api`: axum HTTP surface

pub mod account;
pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod provider;
pub mod router;

pub use config::Config;
pub use error::{ProviderError, RouteError};
pub use health::HealthMonitor;
pub use router::FailoverRouter;
