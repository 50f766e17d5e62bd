//! Handlers for the agent session service.
//!
//! The service keeps the runtime configuration each session was given so a
//! later resume can pick the conversation back up. Talking to the speech
//! model itself happens behind this surface and is not modelled here.

use crate::api::ApiError;
use crate::AgentState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use rehearse_types::{AgentToolDefinition, ConfigureSessionRequest, ScenarioRuntimeConfig};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What a configured agent session holds.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSession {
    pub scenario: ScenarioRuntimeConfig,
    pub tools: Vec<AgentToolDefinition>,
    pub resumes: u32,
}

/// Configured sessions keyed by session id.
///
/// Uses `std::sync::RwLock`: every acquisition is a single map operation
/// that never spans an `.await`.
#[derive(Debug, Clone, Default)]
pub struct AgentSessions {
    inner: Arc<RwLock<HashMap<String, AgentSession>>>,
}

impl AgentSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AgentSession>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("agent sessions lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AgentSession>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("agent sessions lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Stores or replaces the configuration for `session_id`.
    pub fn configure(&self, session_id: &str, request: ConfigureSessionRequest) {
        self.write().insert(
            session_id.to_string(),
            AgentSession {
                scenario: request.scenario,
                tools: request.tools,
                resumes: 0,
            },
        );
    }

    /// Returns `false` if the session was never configured.
    pub fn resume(&self, session_id: &str) -> bool {
        match self.write().get_mut(session_id) {
            Some(session) => {
                session.resumes += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, session_id: &str) -> Option<AgentSession> {
        self.write().remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<AgentSession> {
        self.read().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Handler for `POST /sessions/{id}/configure`.
pub async fn configure_handler(
    Extension(state): Extension<AgentState>,
    Path(session_id): Path<String>,
    Json(payload): Json<ConfigureSessionRequest>,
) -> Result<StatusCode, ApiError> {
    if payload.scenario.scenario_id.trim().is_empty() {
        return Err(ApiError::BadRequest("scenarioId must not be empty".to_string()));
    }
    tracing::info!(
        %session_id,
        scenario_id = %payload.scenario.scenario_id,
        language = %payload.scenario.language,
        tools = payload.tools.len(),
        "agent session configured"
    );
    state.sessions.configure(&session_id, payload);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /sessions/{id}/resume`.
pub async fn resume_handler(
    Extension(state): Extension<AgentState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.sessions.resume(&session_id) {
        return Err(ApiError::NotFound(session_id));
    }
    tracing::info!(%session_id, "agent session resumed");
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `DELETE /sessions/{id}`. Unknown ids are not an error.
pub async fn close_handler(
    Extension(state): Extension<AgentState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.sessions.remove(&session_id).is_some() {
        tracing::info!(%session_id, "agent session closed");
    }
    StatusCode::NO_CONTENT
}
