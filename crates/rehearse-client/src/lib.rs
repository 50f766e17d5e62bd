//! Client-side voice session core for Rehearse training scenarios.
//!
//! A [`VoiceSession`] connects a trainee's microphone to a remote voice
//! agent: it fetches session tokens, negotiates a peer connection through the
//! signaling service, configures the agent with the scenario's runtime
//! settings and walks the scenario's steps. Progress is reported as
//! [`SessionEvent`]s on an ordered stream.
//!
//! Platform capabilities (capture devices, audio graphs, peer connections)
//! are traits in [`media`] and [`transport`]; remote services are traits in
//! [`remote`], with `reqwest` implementations included.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod remote;
pub mod scenario;
pub mod session;
pub mod transport;
pub mod vad;

pub use config::{ClientConfig, ConfigError, IceServer, ReconnectionPolicy, VadSettings};
pub use error::ClientError;
pub use events::{EventBus, SessionEvent};
pub use media::{
    AudioAnalyser, AudioConstraints, AudioContext, AudioContextFactory, MediaConstraints,
    MediaDevices, MediaStream, MediaTrack, TrackKind,
};
pub use remote::{
    AgentApi, HttpAgentClient, HttpSignalingClient, SessionTokens, SignalingApi, TokenProvider,
};
pub use scenario::{ScenarioEngine, ScenarioNotice};
pub use session::{Collaborators, SessionOptions, SessionState, VoiceSession};
pub use transport::{
    NegotiationTransport, OfferOptions, PeerConnection, PeerConnectionFactory,
    PeerConnectionState, PeerEvent,
};
pub use vad::{rms, VoiceActivitySensor, ANALYSER_FFT_SIZE};
