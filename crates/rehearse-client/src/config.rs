//! Client configuration loading from TOML.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::media::MediaConstraints;
use rehearse_types::{FeatureFlags, LatencyHints, ScenarioRuntimeConfig, VoiceProfileConfig};

fn default_api_url() -> String {
    "https://api.openai.com/v1/realtime".to_string()
}

fn default_signaling_url() -> String {
    "https://signaling.maka.internal".to_string()
}

fn default_orchestrator_url() -> String {
    "https://orchestrator.maka.internal".to_string()
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        },
        IceServer {
            urls: vec!["turn:turn.maka.internal:3478".to_string()],
            username: Some("maka-sdk".to_string()),
            credential: Some("voice-agent".to_string()),
        },
    ]
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Realtime model endpoint, for peer factories that dial the model
    /// directly.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the signaling service.
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,

    /// Base URL of the agent session service.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,

    /// Latency hints stamped on runtime configs built by [`ClientConfig::runtime`].
    #[serde(default)]
    pub default_latency: LatencyHints,

    /// Retry policy for callers layering retries around `connect`/`resume`.
    /// The session itself never retries.
    #[serde(default)]
    pub reconnection: ReconnectionPolicy,

    /// STUN/TURN servers used for every peer connection.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    pub vad: VadSettings,

    /// Constraints used when acquiring the microphone.
    #[serde(default)]
    pub media: MediaConstraints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            signaling_url: default_signaling_url(),
            orchestrator_url: default_orchestrator_url(),
            default_latency: LatencyHints::default(),
            reconnection: ReconnectionPolicy::default(),
            ice_servers: default_ice_servers(),
            features: FeatureFlags::default(),
            vad: VadSettings::default(),
            media: MediaConstraints::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectionPolicy {
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_ms: 750,
        }
    }
}

/// Voice-activity classification settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadSettings {
    /// RMS energy above which a sample counts as speech.
    pub threshold: f32,
    /// Sampling tick. Defaults to one display frame.
    pub analysis_interval_ms: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            analysis_interval_ms: 16,
        }
    }
}

/// A STUN or TURN server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
}

impl fmt::Debug for IceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ClientConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Unlike the server loader, a missing file is an error: a client
    /// pointed at a config path expects it to exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Runtime settings for one scenario, carrying this config's latency
    /// hints and feature flags.
    pub fn runtime(
        &self,
        scenario_id: impl Into<String>,
        language: impl Into<String>,
        voice_profile: VoiceProfileConfig,
    ) -> ScenarioRuntimeConfig {
        ScenarioRuntimeConfig {
            scenario_id: scenario_id.into(),
            language: language.into(),
            fallback_locale: None,
            voice_profile,
            latency: self.default_latency,
            features: self.features,
        }
    }
}
