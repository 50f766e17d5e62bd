//! HTTP surfaces for Rehearse voice sessions.
//!
//! Two independent services share this crate: the signaling service, which
//! relays offers, answers and candidates through a [`SignalingStore`], and the
//! agent session service, which records how each remote agent session was
//! configured. Each runs as its own binary.

pub mod api;
pub mod api_agent;
pub mod api_signaling;
pub mod config;
pub mod startup;

use api_agent::AgentSessions;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use rehearse_signaling::SignalingStore;
use rehearse_types::HealthResponse;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Request bodies are SDP blobs and small JSON documents.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// State shared by the signaling handlers.
#[derive(Debug, Clone, Default)]
pub struct SignalingState {
    pub store: SignalingStore,
}

/// State shared by the agent session handlers.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub sessions: AgentSessions,
}

/// Health check handler.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the signaling service router.
pub fn signaling_app(state: SignalingState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/sessions", post(api_signaling::create_session_handler))
        .route(
            "/sessions/{id}/offer",
            post(api_signaling::submit_offer_handler),
        )
        .route(
            "/sessions/{id}/ice",
            post(api_signaling::submit_candidate_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

/// Builds the agent session service router.
pub fn agent_app(state: AgentState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route(
            "/sessions/{id}/configure",
            post(api_agent::configure_handler),
        )
        .route("/sessions/{id}/resume", post(api_agent::resume_handler))
        .route("/sessions/{id}", delete(api_agent::close_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

/// Which service a binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Signaling,
    Agent,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Signaling => "rehearse-signaling",
            Service::Agent => "rehearse-agent",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Service::Signaling => 4010,
            Service::Agent => 4001,
        }
    }

    /// Router with fresh, empty state.
    pub fn router(self) -> Router {
        match self {
            Service::Signaling => signaling_app(SignalingState::default()),
            Service::Agent => agent_app(AgentState::default()),
        }
    }
}
