//! Voice session orchestration.
//!
//! [`VoiceSession`] is the lifecycle state machine:
//!
//! ```text
//! idle ──connect──▶ connecting ──▶ connected ◀──▶ reconnecting
//!   ▲                   │              │               │
//!   └──── connect ── disconnected ◀────┴───────────────┘
//! ```
//!
//! `connect` acquires the microphone, attaches voice-activity sensing,
//! negotiates the peer connection through the signaling service, configures
//! the remote agent and starts the scenario engine. Every resource is placed
//! into the session's acquisition list the moment it is obtained, so a
//! failure, or a `disconnect` racing an in-flight `connect`, releases exactly
//! what was acquired so far.
//!
//! Local candidates gathered by the peer queue on the session and reach the
//! signaling service in generation order, starting once the remote answer
//! has been applied.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; each operation observes the current state before acting.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{EventBus, SessionEvent};
use crate::media::{AudioContext, AudioContextFactory, MediaDevices, MediaStream};
use crate::remote::{AgentApi, SessionTokens, SignalingApi, TokenProvider};
use crate::scenario::{ScenarioEngine, ScenarioNotice};
use crate::transport::{NegotiationTransport, PeerConnectionFactory, PeerConnectionState, PeerEvent};
use crate::vad::VoiceActivitySensor;
use rehearse_types::{
    validate_scenario, AgentToolDefinition, IceCandidate, Scenario, ScenarioRuntimeConfig,
    ScenarioStep,
};

/// Sample rate of the audio analysis graph when the media constraints do not
/// name one.
const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Lifecycle state of a [`VoiceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether `connect` may be called from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session is asked to run.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Raw scenario document; validated on construction and on every connect.
    pub scenario: serde_json::Value,
    /// Sent to the agent service as the `scenario` field of configure.
    pub runtime: ScenarioRuntimeConfig,
    pub tools: Vec<AgentToolDefinition>,
    pub config: ClientConfig,
}

/// Platform and remote collaborators the session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub media_devices: Arc<dyn MediaDevices>,
    pub audio: Arc<dyn AudioContextFactory>,
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub tokens: Arc<dyn TokenProvider>,
    pub signaling: Arc<dyn SignalingApi>,
    pub agent: Arc<dyn AgentApi>,
}

/// Everything a connect attempt has acquired.
#[derive(Default)]
struct Resources {
    local_stream: Option<MediaStream>,
    audio_context: Option<Arc<dyn AudioContext>>,
    sensor: Option<VoiceActivitySensor>,
    transport: Option<Arc<NegotiationTransport>>,
    engine: Option<ScenarioEngine>,
    tasks: Vec<JoinHandle<()>>,
    agent_configured: bool,
}

impl Resources {
    /// Releases everything that does not need a network round-trip, in
    /// teardown order.
    fn release_local(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
        if let Some(stream) = self.local_stream.take() {
            stream.stop_all();
        }
        if let Some(mut sensor) = self.sensor.take() {
            sensor.detach();
        }
        if let Some(context) = self.audio_context.take() {
            context.close();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct Inner {
    state: SessionState,
    /// Bumped by every connect and disconnect; a connect whose number is
    /// stale has been cancelled.
    attempt: u64,
    scenario: Arc<Scenario>,
    tokens: Option<SessionTokens>,
    resources: Resources,
    /// Local candidates waiting for delivery to the signaling service.
    pending_candidates: VecDeque<IceCandidate>,
    /// Set once the remote answer is applied. Until then the signaling
    /// record may not exist, so candidates only queue.
    deliver_candidates: bool,
}

impl Inner {
    /// Drops queued local candidates and parks the forwarder.
    fn reset_candidates(&mut self) {
        self.pending_candidates.clear();
        self.deliver_candidates = false;
    }
}

struct Shared {
    inner: Mutex<Inner>,
    bus: EventBus,
    candidates_ready: Arc<Notify>,
    span: tracing::Span,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("voice session lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Writes the new state and publishes it while the caller holds the lock,
    /// so event order matches write order.
    fn transition(&self, inner: &mut Inner, to: SessionState) {
        let from = inner.state;
        inner.state = to;
        self.span.in_scope(|| {
            tracing::info!(from = %from, to = %to, "voice session state changed");
        });
        self.bus.publish(SessionEvent::State(to));
    }

    fn on_peer_state(&self, peer_state: PeerConnectionState) {
        let mut inner = self.lock();
        tracing::debug!(?peer_state, session_state = %inner.state, "peer connection state");
        if peer_state.is_interrupted() && inner.state == SessionState::Connected {
            tracing::warn!(?peer_state, "media transport interrupted");
            self.transition(&mut inner, SessionState::Reconnecting);
        }
    }
}

/// A live voice conversation bound to one training scenario.
pub struct VoiceSession {
    options: SessionOptions,
    collaborators: Collaborators,
    shared: Arc<Shared>,
}

impl fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceSession")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl VoiceSession {
    /// Validates the scenario and builds an idle session.
    pub fn new(options: SessionOptions, collaborators: Collaborators) -> Result<Self, ClientError> {
        let scenario = validate_scenario(&options.scenario)?;
        let span = tracing::info_span!(
            "voice_session",
            scenario_id = %scenario.id,
            session_id = tracing::field::Empty
        );
        Ok(Self {
            options,
            collaborators,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    attempt: 0,
                    scenario: Arc::new(scenario),
                    tokens: None,
                    resources: Resources::default(),
                    pending_candidates: VecDeque::new(),
                    deliver_candidates: false,
                }),
                bus: EventBus::new(),
                candidates_ready: Arc::new(Notify::new()),
                span,
            }),
        })
    }

    /// Replaces the span session logs are recorded under.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.span = span;
        }
        self
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.shared.bus.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().tokens.as_ref().map(|t| t.session_id.clone())
    }

    pub fn scenario(&self) -> Arc<Scenario> {
        Arc::clone(&self.shared.lock().scenario)
    }

    /// Derived peer state; `None` when no transport is held.
    pub fn connection_state(&self) -> Option<PeerConnectionState> {
        let transport = self.shared.lock().resources.transport.clone();
        transport.map(|t| t.connection_state())
    }

    /// Number of local candidates not yet delivered to signaling.
    pub fn pending_candidate_count(&self) -> usize {
        self.shared.lock().pending_candidates.len()
    }

    /// Opens the session.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidStateTransition`] unless the session is idle or
    /// disconnected; that rejection has no side effects. Any later failure
    /// releases everything acquired so far, leaves the session
    /// disconnected and returns the cause. [`ClientError::ConnectAborted`]
    /// if `disconnect` was called while this connect was in flight.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let attempt = {
            let mut inner = self.shared.lock();
            if !inner.state.can_connect() {
                return Err(ClientError::InvalidStateTransition {
                    state: inner.state,
                    operation: "connect",
                });
            }
            inner.attempt += 1;
            inner.reset_candidates();
            self.shared.transition(&mut inner, SessionState::Connecting);
            inner.attempt
        };

        let result = self
            .establish(attempt)
            .instrument(self.shared.span.clone())
            .await;
        if let Err(err) = &result {
            self.abandon(attempt, err).await;
        }
        result
    }

    async fn establish(&self, attempt: u64) -> Result<(), ClientError> {
        let config = &self.options.config;
        let collaborators = &self.collaborators;

        let scenario = Arc::new(validate_scenario(&self.options.scenario)?);
        self.checkpoint(attempt, |inner| inner.scenario = Arc::clone(&scenario))?;

        let tokens = collaborators.tokens.fetch_session_tokens().await?;
        self.shared.span.record("session_id", tokens.session_id.as_str());
        self.checkpoint(attempt, |inner| inner.tokens = Some(tokens.clone()))?;
        tracing::info!(session_id = %tokens.session_id, "session tokens issued");

        let stream = collaborators.media_devices.get_user_media(&config.media).await?;
        self.adopt(attempt, |r| r.local_stream = Some(stream.clone()))?;

        let sample_rate = config.media.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let context = collaborators.audio.create(sample_rate)?;
        self.adopt(attempt, |r| r.audio_context = Some(Arc::clone(&context)))?;

        let mut sensor = VoiceActivitySensor::new(config.vad);
        let bus = self.shared.bus.clone();
        sensor.attach(&stream, context.as_ref(), move |speaking| {
            bus.publish(SessionEvent::VoiceActivity { speaking });
        });
        self.adopt(attempt, |r| r.sensor = Some(sensor))?;

        self.negotiate(attempt, &tokens, &stream).await?;

        collaborators
            .agent
            .configure(&tokens, &self.options.runtime, &self.options.tools)
            .await?;
        if let Err(err) = self.adopt(attempt, |r| r.agent_configured = true) {
            // The disconnect that cancelled us ran before configure landed.
            if let Err(close_err) = collaborators.agent.close(&tokens.session_id).await {
                tracing::warn!(error = %close_err, "failed to delete agent session after abort");
            }
            return Err(err);
        }

        let bus = self.shared.bus.clone();
        let mut engine = ScenarioEngine::new(scenario.steps.clone(), move |notice| match notice {
            ScenarioNotice::StepChanged { index, step } => bus.publish(SessionEvent::Step {
                index,
                step_id: step.id,
            }),
            ScenarioNotice::Completed => bus.publish(SessionEvent::ScenarioComplete),
        });

        let mut inner = self.shared.lock();
        if !Self::is_current(&inner, attempt) {
            return Err(ClientError::ConnectAborted);
        }
        engine.start();
        inner.resources.engine = Some(engine);
        self.shared.transition(&mut inner, SessionState::Connected);
        Ok(())
    }

    async fn negotiate(
        &self,
        attempt: u64,
        tokens: &SessionTokens,
        stream: &MediaStream,
    ) -> Result<(), ClientError> {
        let transport = Arc::new(NegotiationTransport::new(
            Arc::clone(&self.collaborators.peers),
            self.options.config.ice_servers.clone(),
        ));
        let events = transport
            .take_events()
            .ok_or_else(|| ClientError::Negotiation("peer event channel unavailable".to_string()))?;
        self.adopt(attempt, |r| r.transport = Some(Arc::clone(&transport)))?;

        let span = self.shared.span.clone();
        let pump = tokio::spawn(pump_peer_events(Arc::downgrade(&self.shared), events).instrument(span.clone()));
        let forwarder = tokio::spawn(
            forward_candidates(
                Arc::downgrade(&self.shared),
                Arc::clone(&self.shared.candidates_ready),
                Arc::clone(&self.collaborators.signaling),
                tokens.clone(),
            )
            .instrument(span),
        );
        self.adopt(attempt, |r| r.tasks.extend([pump, forwarder]))?;

        let offer = transport.create_offer(stream).await?;
        self.checkpoint(attempt, |_| ())?;
        let answer = self.collaborators.signaling.submit_offer(tokens, &offer).await?;
        self.checkpoint(attempt, |_| ())?;
        transport.accept_answer(answer).await?;
        self.checkpoint(attempt, |inner| inner.deliver_candidates = true)?;
        self.shared.candidates_ready.notify_one();
        tracing::info!("media negotiation complete");
        Ok(())
    }

    fn is_current(inner: &Inner, attempt: u64) -> bool {
        inner.attempt == attempt && inner.state == SessionState::Connecting
    }

    /// Applies `update` if `attempt` is still the live connect.
    fn checkpoint(&self, attempt: u64, update: impl FnOnce(&mut Inner)) -> Result<(), ClientError> {
        let mut inner = self.shared.lock();
        if !Self::is_current(&inner, attempt) {
            return Err(ClientError::ConnectAborted);
        }
        update(&mut inner);
        Ok(())
    }

    /// Records a freshly acquired resource. If the attempt has been
    /// cancelled the resource is released on the spot instead.
    fn adopt(&self, attempt: u64, place: impl FnOnce(&mut Resources)) -> Result<(), ClientError> {
        {
            let mut inner = self.shared.lock();
            if Self::is_current(&inner, attempt) {
                place(&mut inner.resources);
                return Ok(());
            }
        }
        let mut orphan = Resources::default();
        place(&mut orphan);
        orphan.release_local();
        Err(ClientError::ConnectAborted)
    }

    /// Rolls back a failed connect, unless a disconnect already did.
    async fn abandon(&self, attempt: u64, err: &ClientError) {
        let (resources, tokens) = {
            let mut inner = self.shared.lock();
            if inner.attempt != attempt {
                tracing::debug!(error = %err, "connect cancelled, teardown already done");
                return;
            }
            tracing::warn!(error = %err, "connect failed, releasing acquired resources");
            inner.reset_candidates();
            let resources = std::mem::take(&mut inner.resources);
            let tokens = inner.tokens.take();
            self.shared.transition(&mut inner, SessionState::Disconnected);
            (resources, tokens)
        };
        let remote = tokens
            .filter(|_| resources.agent_configured)
            .map(|t| t.session_id);
        self.teardown(resources, remote).await;
    }

    /// Asks the agent service to resume the existing session.
    ///
    /// Does not renegotiate media. On failure the session stays
    /// reconnecting and the caller decides whether to retry or reconnect.
    pub async fn resume(&self) -> Result<(), ClientError> {
        let session_id = {
            let mut inner = self.shared.lock();
            let Some(session_id) = inner.tokens.as_ref().map(|t| t.session_id.clone()) else {
                return Err(ClientError::NoActiveSession);
            };
            match inner.state {
                SessionState::Connected => {
                    self.shared.transition(&mut inner, SessionState::Reconnecting);
                }
                SessionState::Reconnecting => {}
                state => {
                    return Err(ClientError::InvalidStateTransition {
                        state,
                        operation: "resume",
                    })
                }
            }
            session_id
        };

        if let Err(err) = self
            .collaborators
            .agent
            .resume(&session_id)
            .instrument(self.shared.span.clone())
            .await
        {
            tracing::warn!(session_id = %session_id, error = %err, "resume failed");
            return Err(err);
        }

        let mut inner = self.shared.lock();
        let same_session = inner
            .tokens
            .as_ref()
            .is_some_and(|t| t.session_id == session_id);
        if same_session && inner.state == SessionState::Reconnecting {
            self.shared.transition(&mut inner, SessionState::Connected);
        } else {
            tracing::debug!(state = %inner.state, "session changed while resuming, state left as is");
        }
        Ok(())
    }

    /// Closes the session. Best effort and idempotent: teardown failures
    /// are logged, never returned. Cancels an in-flight `connect`.
    pub async fn disconnect(&self) {
        let (resources, tokens) = {
            let mut inner = self.shared.lock();
            inner.attempt += 1;
            if inner.state != SessionState::Disconnected {
                self.shared.transition(&mut inner, SessionState::Disconnected);
            }
            inner.reset_candidates();
            (std::mem::take(&mut inner.resources), inner.tokens.take())
        };
        self.teardown(resources, tokens.map(|t| t.session_id))
            .instrument(self.shared.span.clone())
            .await;
    }

    /// Releases `resources` in teardown order, deleting the remote agent
    /// session in between when `remote_session` is set.
    async fn teardown(&self, mut resources: Resources, remote_session: Option<String>) {
        if let Some(transport) = resources.transport.take() {
            transport.close();
        }
        if let Some(session_id) = remote_session {
            if let Err(err) = self.collaborators.agent.close(&session_id).await {
                tracing::warn!(session_id = %session_id, error = %err, "failed to delete agent session");
            }
        }
        resources.release_local();
    }

    /// Forwards a candidate received from the remote peer to the transport.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError> {
        let transport = self.shared.lock().resources.transport.clone();
        match transport {
            Some(transport) => transport.add_ice_candidate(candidate).await,
            None => Err(ClientError::NoActiveNegotiation),
        }
    }

    pub fn advance_step(&self) {
        self.with_engine(ScenarioEngine::advance);
    }

    pub fn previous_step(&self) {
        self.with_engine(ScenarioEngine::previous);
    }

    pub fn jump_to_step(&self, index: usize) {
        self.with_engine(|engine| engine.set_index(index));
    }

    pub fn reset_steps(&self) {
        self.with_engine(ScenarioEngine::reset);
    }

    pub fn current_step(&self) -> Option<ScenarioStep> {
        let inner = self.shared.lock();
        inner
            .resources
            .engine
            .as_ref()
            .and_then(|e| e.current_step().cloned())
    }

    pub fn current_step_index(&self) -> Option<usize> {
        let inner = self.shared.lock();
        inner.resources.engine.as_ref().and_then(ScenarioEngine::index)
    }

    fn with_engine(&self, op: impl FnOnce(&mut ScenarioEngine)) {
        let mut inner = self.shared.lock();
        if let Some(engine) = inner.resources.engine.as_mut() {
            op(engine);
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.resources.release_local();
    }
}

async fn pump_peer_events(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(live) = shared.upgrade() else {
            break;
        };
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let deliver = {
                    let mut inner = live.lock();
                    inner.pending_candidates.push_back(candidate);
                    inner.deliver_candidates
                };
                if deliver {
                    live.candidates_ready.notify_one();
                }
            }
            PeerEvent::ConnectionState(state) => live.on_peer_state(state),
            PeerEvent::RemoteStream(stream) => {
                tracing::info!(stream_id = stream.id(), "remote stream received");
                live.bus.publish(SessionEvent::RemoteStream(stream));
            }
        }
    }
}

/// Delivers queued local candidates one at a time, in generation order,
/// once the session has accepted the remote answer.
async fn forward_candidates(
    shared: Weak<Shared>,
    ready: Arc<Notify>,
    signaling: Arc<dyn SignalingApi>,
    tokens: SessionTokens,
) {
    loop {
        ready.notified().await;
        loop {
            let Some(live) = shared.upgrade() else {
                return;
            };
            let next = {
                let mut inner = live.lock();
                if inner.deliver_candidates {
                    inner.pending_candidates.pop_front()
                } else {
                    None
                }
            };
            drop(live);
            let Some(candidate) = next else {
                break;
            };
            if let Err(err) = signaling.submit_candidate(&tokens, &candidate).await {
                tracing::warn!(error = %err, "failed to deliver local candidate");
            }
        }
    }
}
