//! HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /` - Liveness line
//! - `GET /api/generate?prefix=` - Provision a disposable address
//! - `GET /api/messages?prefix=` - List an inbox
//! - `GET /api/message?prefix=&id=` - Fetch one message with body
//! - `GET /api/health` - Provider health snapshots

mod routes;
pub mod types;

pub use routes::serve;
