//! Shared types for the Rehearse voice training platform.
//!
//! This crate holds the data model that crosses crate and process
//! boundaries: the training scenario document, the runtime configuration
//! sent to the agent service, tool definitions, and the JSON bodies of the
//! signaling and agent session HTTP APIs.
//!
//! No crate in the workspace depends on anything *except* `rehearse-types`
//! for cross-cutting type definitions.

pub mod runtime;
pub mod scenario;
pub mod signaling;

pub use runtime::{
    AgentToolDefinition, ConfigureSessionRequest, FeatureFlags, LatencyHints,
    ScenarioRuntimeConfig, VoiceModulation, VoiceProfileConfig,
};
pub use scenario::{
    validate_scenario, Difficulty, KnowledgeEntry, Objection, Objective, Persona, Scenario,
    ScenarioStep, Scoring, ValidationError,
};
pub use signaling::{
    AnswerResponse, CandidateRequest, CreateSessionResponse, HealthResponse, IceCandidate,
    OfferRequest, SdpType, SessionDescription,
};
