//! Remote collaborators: token issuance, the signaling service and the agent
//! session service.
//!
//! The session talks to each one through a trait so embedders can swap the
//! HTTP clients for their own plumbing. [`HttpSignalingClient`] and
//! [`HttpAgentClient`] are the stock `reqwest` implementations.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ClientConfig;
use crate::error::ClientError;
use rehearse_types::{
    AgentToolDefinition, AnswerResponse, CandidateRequest, ConfigureSessionRequest,
    CreateSessionResponse, HealthResponse, IceCandidate, OfferRequest, ScenarioRuntimeConfig,
    SessionDescription,
};

/// Credentials for one connection attempt. Expiring and never renewed here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub session_id: String,
    /// Bearer token for the agent session service.
    pub realtime_token: String,
    /// Bearer token for the signaling service.
    pub signaling_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("session_id", &self.session_id)
            .field("realtime_token", &"[REDACTED]")
            .field("signaling_token", &"[REDACTED]")
            .finish()
    }
}

/// Issues [`SessionTokens`]. Called once per `connect`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_session_tokens(&self) -> Result<SessionTokens, ClientError>;
}

#[async_trait]
pub trait SignalingApi: Send + Sync {
    async fn submit_offer(
        &self,
        tokens: &SessionTokens,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, ClientError>;

    async fn submit_candidate(
        &self,
        tokens: &SessionTokens,
        candidate: &IceCandidate,
    ) -> Result<(), ClientError>;
}

#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn configure(
        &self,
        tokens: &SessionTokens,
        runtime: &ScenarioRuntimeConfig,
        tools: &[AgentToolDefinition],
    ) -> Result<(), ClientError>;

    /// Fails with [`ClientError::SessionNotFound`] for an unknown id.
    async fn resume(&self, session_id: &str) -> Result<(), ClientError>;

    /// Deleting an unknown session succeeds.
    async fn close(&self, session_id: &str) -> Result<(), ClientError>;
}

fn build_client() -> Result<Client, ClientError> {
    Client::builder()
        .build()
        .map_err(|e| ClientError::TransportUnavailable(e.to_string()))
}

fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Maps a non-success status to the client error taxonomy.
async fn check(response: Response, session_id: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::SessionNotFound(session_id.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%url, status = status.as_u16(), body = %body, "remote call failed");
    Err(ClientError::UnexpectedStatus {
        status: status.as_u16(),
        url,
    })
}

async fn health(client: &Client, base: &str) -> Result<HealthResponse, ClientError> {
    let url = join(base, "/healthz");
    let response = client.get(&url).send().await?;
    let response = check(response, "").await?;
    Ok(response.json().await?)
}

/// `reqwest` client for the signaling service.
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    base_url: String,
    client: Client,
}

impl HttpSignalingClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client()?,
        })
    }

    /// Client for `config.signaling_url`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::new(config.signaling_url.clone())
    }

    /// Allocates a session on the signaling service.
    pub async fn create_session(&self) -> Result<String, ClientError> {
        let url = join(&self.base_url, "/sessions");
        let response = self.client.post(&url).send().await?;
        let body: CreateSessionResponse = check(response, "").await?.json().await?;
        Ok(body.session_id)
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        health(&self.client, &self.base_url).await
    }

    fn post(&self, tokens: &SessionTokens, suffix: &str) -> RequestBuilder {
        let url = join(
            &self.base_url,
            &format!("/sessions/{}/{}", tokens.session_id, suffix),
        );
        self.client.post(url).bearer_auth(&tokens.signaling_token)
    }
}

#[async_trait]
impl SignalingApi for HttpSignalingClient {
    async fn submit_offer(
        &self,
        tokens: &SessionTokens,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, ClientError> {
        let response = self
            .post(tokens, "offer")
            .json(&OfferRequest {
                offer: offer.clone(),
            })
            .send()
            .await?;
        let body: AnswerResponse = check(response, &tokens.session_id).await?.json().await?;
        Ok(body.answer)
    }

    async fn submit_candidate(
        &self,
        tokens: &SessionTokens,
        candidate: &IceCandidate,
    ) -> Result<(), ClientError> {
        let response = self
            .post(tokens, "ice")
            .json(&CandidateRequest {
                candidate: candidate.clone(),
            })
            .send()
            .await?;
        check(response, &tokens.session_id).await?;
        Ok(())
    }
}

/// `reqwest` client for the agent session service.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    base_url: String,
    client: Client,
}

impl HttpAgentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.into(),
            client: build_client()?,
        })
    }

    /// Client for `config.orchestrator_url`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::new(config.orchestrator_url.clone())
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        health(&self.client, &self.base_url).await
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        join(&self.base_url, &format!("/sessions/{session_id}{suffix}"))
    }
}

#[async_trait]
impl AgentApi for HttpAgentClient {
    async fn configure(
        &self,
        tokens: &SessionTokens,
        runtime: &ScenarioRuntimeConfig,
        tools: &[AgentToolDefinition],
    ) -> Result<(), ClientError> {
        tracing::info!(session_id = %tokens.session_id, "configuring agent session");
        let response = self
            .client
            .post(self.session_url(&tokens.session_id, "/configure"))
            .bearer_auth(&tokens.realtime_token)
            .json(&ConfigureSessionRequest {
                scenario: runtime.clone(),
                tools: tools.to_vec(),
            })
            .send()
            .await?;
        check(response, &tokens.session_id).await?;
        Ok(())
    }

    async fn resume(&self, session_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.session_url(session_id, "/resume"))
            .send()
            .await?;
        check(response, session_id).await?;
        Ok(())
    }

    async fn close(&self, session_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.session_url(session_id, ""))
            .send()
            .await?;
        check(response, session_id).await?;
        Ok(())
    }
}
