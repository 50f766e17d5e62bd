//! Runtime configuration sent to the agent session service.
//!
//! These types form the body of `POST /sessions/{id}/configure`.

use serde::{Deserialize, Serialize};

/// Target and ceiling for agent response latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyHints {
    pub ideal_ms: u32,
    pub max_ms: u32,
}

impl Default for LatencyHints {
    fn default() -> Self {
        Self {
            ideal_ms: 180,
            max_ms: 350,
        }
    }
}

/// Prosody adjustments applied to the agent voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceModulation {
    pub speaking_rate: f32,
    pub pitch: f32,
    pub energy: f32,
}

impl Default for VoiceModulation {
    fn default() -> Self {
        Self {
            speaking_rate: 1.0,
            pitch: 1.0,
            energy: 1.0,
        }
    }
}

/// Which voice the agent speaks with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfileConfig {
    pub voice_profile_id: String,
    #[serde(default)]
    pub modulation: VoiceModulation,
}

/// Optional behaviours toggled per deployment or scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub adaptive_silence_detection: bool,
    pub auto_objection_tagging: bool,
    pub conversation_archiving: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            adaptive_silence_detection: true,
            auto_objection_tagging: true,
            conversation_archiving: true,
        }
    }
}

/// Per-session runtime settings for the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRuntimeConfig {
    pub scenario_id: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_locale: Option<String>,
    pub voice_profile: VoiceProfileConfig,
    #[serde(default)]
    pub latency: LatencyHints,
    #[serde(default)]
    pub features: FeatureFlags,
}

/// A tool the agent may call during the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /sessions/{id}/configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureSessionRequest {
    pub scenario: ScenarioRuntimeConfig,
    pub tools: Vec<AgentToolDefinition>,
}
