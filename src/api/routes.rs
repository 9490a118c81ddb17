//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::account::AccountStore;
use crate::config::Config;
use crate::error::RouteError;
use crate::health::HealthMonitor;
use crate::model::Message;
use crate::provider::mail_tm::MailTmClient;
use crate::provider::one_sec_mail::OneSecMailClient;
use crate::provider::ProviderClient;
use crate::router::{FailoverRouter, GeneratedAddress};

use super::types::{ErrorResponse, HealthResponse};

/// Shared application state.
pub struct AppState {
    pub router: Arc<FailoverRouter>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .user_agent(concat!("maildrophq/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let clients: Vec<Arc<dyn ProviderClient>> = vec![
        Arc::new(MailTmClient::new(
            http.clone(),
            config.mail_tm_base_url.clone(),
            0,
        )),
        Arc::new(OneSecMailClient::new(
            http,
            config.one_sec_mail_base_url.clone(),
            1,
        )),
    ];
    let monitor = Arc::new(HealthMonitor::new(clients.clone(), config.provider_cooldown));
    let router = Arc::new(FailoverRouter::new(
        clients,
        monitor,
        AccountStore::new(),
        config.mailbox_ttl_chrono(),
    ));
    let state = Arc::new(AppState { router });

    let app = Router::new()
        .route("/", get(root))
        .route("/api/generate", get(generate))
        .route("/api/messages", get(messages))
        .route("/api/message", get(message))
        .route("/api/health", get(health))
        .layer(build_cors(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MailDropHQ backend listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([Method::GET])
        .allow_credentials(true)
}

async fn root() -> &'static str {
    "MailDropHQ backend is running."
}

#[derive(Debug, Deserialize)]
struct GenerateParams {
    prefix: Option<String>,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerateParams>,
) -> Result<Json<GeneratedAddress>, ApiError> {
    // `?prefix=` with no value arrives as an empty string.
    let requested = params.prefix.as_deref().filter(|p| !p.is_empty());
    let generated = state
        .router
        .create_address(requested)
        .await
        .map_err(into_response_error)?;
    Ok(Json(generated))
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    prefix: Option<String>,
}

async fn messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MessagesParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let prefix = require(params.prefix.as_deref(), "prefix")?;
    let inbox = state
        .router
        .list_messages(prefix)
        .await
        .map_err(into_response_error)?;
    Ok(Json(inbox))
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    prefix: Option<String>,
    id: Option<String>,
}

async fn message(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MessageParams>,
) -> Result<Json<Message>, ApiError> {
    let prefix = require(params.prefix.as_deref(), "prefix")?;
    let id = require(params.id.as_deref(), "id")?;
    let full = state
        .router
        .fetch_message(prefix, id)
        .await
        .map_err(into_response_error)?;
    Ok(Json(full))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.router.health_snapshot(),
    })
}

fn require<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| into_response_error(RouteError::MissingParam(name)))
}

/// Map a routing failure onto the boundary contract. Upstream detail is
/// logged, never surfaced.
fn into_response_error(err: RouteError) -> ApiError {
    match &err {
        RouteError::InvalidPrefix(_) | RouteError::MissingParam(_) | RouteError::Conflict(_) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(err.to_string())))
        }
        RouteError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(err.to_string())),
        ),
        RouteError::NoProvidersConfigured => (
            StatusCode::NOT_IMPLEMENTED,
            Json(ErrorResponse::new("No inbox providers are configured.")),
        ),
        RouteError::AllProvidersUnavailable { attempts } => {
            for (provider, error) in attempts {
                tracing::error!(
                    provider = %provider,
                    error = %error,
                    "Provider attempt failed"
                );
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "All inbox providers are currently unavailable.",
                )),
            )
        }
    }
}
