//! API response types.
//!
//! Every failure crosses the boundary as `{ "error": ... }` with a status
//! in {400, 404, 500, 501}; success payloads never embed errors.

use serde::Serialize;

use crate::health::ProviderHealthSnapshot;

/// Stable JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// `GET /api/health` payload.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealthSnapshot>,
}
