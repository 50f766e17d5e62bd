//! In-memory stand-ins for the platform media stack and remote services.

#![allow(dead_code)]

use async_trait::async_trait;
use rehearse_client::{
    AgentApi, AudioAnalyser, AudioContext, AudioContextFactory, ClientConfig, ClientError,
    Collaborators, IceServer, MediaConstraints, MediaDevices, MediaStream, MediaTrack,
    OfferOptions, PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEvent,
    SessionEvent, SessionOptions, SessionState, SessionTokens, SignalingApi, TokenProvider,
    TrackKind, VoiceSession,
};
use rehearse_signaling::{SignalingError, SignalingStore};
use rehearse_types::{
    AgentToolDefinition, IceCandidate, ScenarioRuntimeConfig, SessionDescription,
    VoiceProfileConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub fn scenario_document() -> serde_json::Value {
    json!({
        "id": "renewal-call",
        "title": "Contract renewal",
        "persona": {
            "id": "buyer",
            "name": "Claire",
            "description": "Procurement lead at a mid-size retailer",
            "tone": "skeptical"
        },
        "objectives": [
            { "id": "close", "description": "Secure the renewal", "successCriteria": ["verbal yes"] }
        ],
        "steps": [
            { "id": "opening", "title": "Opening", "prompt": "Introduce yourself" },
            { "id": "discovery", "title": "Discovery", "prompt": "Ask about usage", "objectionIds": ["budget"] },
            { "id": "close", "title": "Close", "prompt": "Ask for the renewal" }
        ],
        "objections": {
            "budget": { "id": "budget", "summary": "Budget was cut this year" }
        }
    })
}

pub fn runtime_config() -> ScenarioRuntimeConfig {
    ScenarioRuntimeConfig {
        scenario_id: "renewal-call".to_string(),
        language: "fr-FR".to_string(),
        fallback_locale: Some("en-US".to_string()),
        voice_profile: VoiceProfileConfig {
            voice_profile_id: "warm-female".to_string(),
            modulation: Default::default(),
        },
        latency: Default::default(),
        features: Default::default(),
    }
}

pub fn candidate(port: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:1 1 udp 2122260223 192.168.1.20 {port} typ host"),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
    }
}

pub struct FakeTrack {
    id: String,
    live: AtomicBool,
    stops: AtomicUsize,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            live: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeDevices {
    pub track: Arc<FakeTrack>,
    pub deny: AtomicBool,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            track: FakeTrack::new("mic-0"),
            deny: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn get_user_media(&self, _constraints: &MediaConstraints) -> Result<MediaStream, ClientError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(ClientError::Media("permission denied".to_string()));
        }
        let track: Arc<dyn MediaTrack> = self.track.clone();
        Ok(MediaStream::new("local", vec![track]))
    }
}

struct LevelAnalyser(f32);

impl AudioAnalyser for LevelAnalyser {
    fn fft_size(&self) -> usize {
        64
    }

    fn time_domain_data(&mut self, buffer: &mut [f32]) {
        buffer.fill(self.0);
    }

    fn disconnect(&mut self) {}
}

pub struct FakeAudioContext {
    level: Option<f32>,
    closed: AtomicBool,
}

impl FakeAudioContext {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl AudioContext for FakeAudioContext {
    fn create_analyser(&self, _stream: &MediaStream, _fft_size: usize) -> Option<Box<dyn AudioAnalyser>> {
        self.level
            .map(|level| Box::new(LevelAnalyser(level)) as Box<dyn AudioAnalyser>)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Opens contexts whose analyser reports a constant `level`, or none at all.
pub struct FakeAudio {
    level: Option<f32>,
    pub contexts: Mutex<Vec<Arc<FakeAudioContext>>>,
}

impl FakeAudio {
    pub fn new(level: Option<f32>) -> Self {
        Self {
            level,
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn latest(&self) -> Arc<FakeAudioContext> {
        self.contexts.lock().unwrap().last().cloned().expect("no audio context opened")
    }
}

impl AudioContextFactory for FakeAudio {
    fn create(&self, _sample_rate: u32) -> Result<Arc<dyn AudioContext>, ClientError> {
        let context = Arc::new(FakeAudioContext {
            level: self.level,
            closed: AtomicBool::new(false),
        });
        self.contexts.lock().unwrap().push(Arc::clone(&context));
        Ok(context)
    }
}

pub struct FakePeer {
    events: mpsc::UnboundedSender<PeerEvent>,
    tracks: Mutex<Vec<Arc<dyn MediaTrack>>>,
    state: Mutex<PeerConnectionState>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub applied: Mutex<Vec<IceCandidate>>,
    /// How many upcoming `add_ice_candidate` calls to reject.
    pub reject_candidates: AtomicUsize,
    closed: AtomicBool,
}

impl FakePeer {
    /// Reports a locally gathered candidate.
    pub fn gather(&self, candidate: IceCandidate) {
        let _ = self.events.send(PeerEvent::LocalCandidate(candidate));
    }

    pub fn set_state(&self, state: PeerConnectionState) {
        *self.state.lock().unwrap() = state;
        let _ = self.events.send(PeerEvent::ConnectionState(state));
    }

    pub fn deliver_remote_stream(&self, id: &str) {
        let _ = self
            .events
            .send(PeerEvent::RemoteStream(MediaStream::new(id, Vec::new())));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn applied_ports(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.rsplit(' ').nth(2).unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn add_track(&self, track: Arc<dyn MediaTrack>, _stream: &MediaStream) -> Result<(), ClientError> {
        self.tracks.lock().unwrap().push(track);
        Ok(())
    }

    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, ClientError> {
        assert!(options.offer_to_receive_audio);
        assert!(!options.offer_to_receive_video);
        Ok(SessionDescription::offer(
            "v=0\r\no=- 42 2 IN IP4 127.0.0.1\r\ns=-\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=sendrecv\r\n",
        ))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), ClientError> {
        *self.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), ClientError> {
        *self.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError> {
        let rejected = self
            .reject_candidates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(ClientError::Negotiation(format!(
                "malformed candidate: {}",
                candidate.candidate
            )));
        }
        self.applied.lock().unwrap().push(candidate);
        Ok(())
    }

    fn sender_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.state.lock().unwrap()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = PeerConnectionState::Closed;
    }
}

#[derive(Default)]
pub struct FakePeers {
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakePeers {
    pub fn latest(&self) -> Arc<FakePeer> {
        self.peers.lock().unwrap().last().cloned().expect("no peer created")
    }

    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

impl PeerConnectionFactory for FakePeers {
    fn create(
        &self,
        _ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, ClientError> {
        let peer = Arc::new(FakePeer {
            events,
            tracks: Mutex::new(Vec::new()),
            state: Mutex::new(PeerConnectionState::New),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            applied: Mutex::new(Vec::new()),
            reject_candidates: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(peer)
    }
}

/// Issues tokens for sessions allocated in the shared signaling store.
pub struct FakeTokens {
    store: SignalingStore,
    pub issued: AtomicUsize,
    /// When cleared, ids are minted locally and the signaling record only
    /// appears with the first offer.
    pub register: AtomicBool,
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_session_tokens(&self) -> Result<SessionTokens, ClientError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let session_id = if self.register.load(Ordering::SeqCst) {
            self.store
                .create_session()
                .map_err(|e| ClientError::TransportUnavailable(e.to_string()))?
        } else {
            format!("sess-{n}")
        };
        Ok(SessionTokens {
            session_id,
            realtime_token: format!("rt-{n}"),
            signaling_token: format!("sig-{n}"),
        })
    }
}

/// Talks to a [`SignalingStore`] in-process.
pub struct StoreSignaling {
    pub store: SignalingStore,
    pub offers: AtomicUsize,
    /// When set, `submit_offer` parks until the gate is notified.
    pub offer_gate: Mutex<Option<Arc<Notify>>>,
    /// Every candidate submission the store refused.
    pub candidate_errors: Mutex<Vec<String>>,
}

impl StoreSignaling {
    pub fn new(store: SignalingStore) -> Self {
        Self {
            store,
            offers: AtomicUsize::new(0),
            offer_gate: Mutex::new(None),
            candidate_errors: Mutex::new(Vec::new()),
        }
    }

    pub fn offer_calls(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn candidate_errors(&self) -> Vec<String> {
        self.candidate_errors.lock().unwrap().clone()
    }
}

fn signaling_error(err: SignalingError) -> ClientError {
    match err {
        SignalingError::SessionNotFound(id) => ClientError::SessionNotFound(id),
        other => ClientError::TransportUnavailable(other.to_string()),
    }
}

#[async_trait]
impl SignalingApi for StoreSignaling {
    async fn submit_offer(
        &self,
        tokens: &SessionTokens,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, ClientError> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        let gate = self.offer_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.store
            .submit_offer(&tokens.session_id, offer.clone())
            .map_err(signaling_error)
    }

    async fn submit_candidate(
        &self,
        tokens: &SessionTokens,
        candidate: &IceCandidate,
    ) -> Result<(), ClientError> {
        let result = self
            .store
            .submit_candidate(&tokens.session_id, candidate.clone())
            .map_err(signaling_error);
        if let Err(err) = &result {
            self.candidate_errors.lock().unwrap().push(err.to_string());
        }
        result
    }
}

#[derive(Default)]
pub struct FakeAgent {
    pub configured: Mutex<Vec<(String, ScenarioRuntimeConfig)>>,
    pub resumed: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
    pub fail_configure: AtomicBool,
    pub fail_resume: AtomicBool,
    /// When set, configure parks until the gate is notified.
    pub configure_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeAgent {
    pub fn configure_calls(&self) -> usize {
        self.configured.lock().unwrap().len()
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentApi for FakeAgent {
    async fn configure(
        &self,
        tokens: &SessionTokens,
        runtime: &ScenarioRuntimeConfig,
        _tools: &[AgentToolDefinition],
    ) -> Result<(), ClientError> {
        self.configured
            .lock()
            .unwrap()
            .push((tokens.session_id.clone(), runtime.clone()));
        let gate = self.configure_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_configure.load(Ordering::SeqCst) {
            return Err(ClientError::UnexpectedStatus {
                status: 503,
                url: "http://agent.test/configure".to_string(),
            });
        }
        Ok(())
    }

    async fn resume(&self, session_id: &str) -> Result<(), ClientError> {
        self.resumed.lock().unwrap().push(session_id.to_string());
        if self.fail_resume.load(Ordering::SeqCst) {
            return Err(ClientError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn close(&self, session_id: &str) -> Result<(), ClientError> {
        self.closed.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

/// Every fake wired together around one signaling store.
pub struct Harness {
    pub store: SignalingStore,
    pub devices: Arc<FakeDevices>,
    pub audio: Arc<FakeAudio>,
    pub peers: Arc<FakePeers>,
    pub tokens: Arc<FakeTokens>,
    pub signaling: Arc<StoreSignaling>,
    pub agent: Arc<FakeAgent>,
}

impl Harness {
    /// A harness whose audio graph yields no analyser, so no voice-activity
    /// samples interleave with the events under test.
    pub fn new() -> Self {
        Self::with_audio_level(None)
    }

    pub fn with_audio_level(level: Option<f32>) -> Self {
        let store = SignalingStore::new();
        Self {
            devices: Arc::new(FakeDevices::new()),
            audio: Arc::new(FakeAudio::new(level)),
            peers: Arc::new(FakePeers::default()),
            tokens: Arc::new(FakeTokens {
                store: store.clone(),
                issued: AtomicUsize::new(0),
                register: AtomicBool::new(true),
            }),
            signaling: Arc::new(StoreSignaling::new(store.clone())),
            agent: Arc::new(FakeAgent::default()),
            store,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            media_devices: self.devices.clone(),
            audio: self.audio.clone(),
            peers: self.peers.clone(),
            tokens: self.tokens.clone(),
            signaling: self.signaling.clone(),
            agent: self.agent.clone(),
        }
    }

    pub fn options(&self) -> SessionOptions {
        let mut config = ClientConfig::default();
        config.vad.analysis_interval_ms = 5;
        SessionOptions {
            scenario: scenario_document(),
            runtime: runtime_config(),
            tools: vec![AgentToolDefinition {
                name: "log_objection".to_string(),
                description: "Record an objection raised by the trainee".to_string(),
                parameters: Default::default(),
            }],
            config,
        }
    }

    pub fn session(&self) -> VoiceSession {
        VoiceSession::new(self.options(), self.collaborators()).expect("scenario should be valid")
    }
}

/// Drains whatever is queued without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::State(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// Waits for the first event matching `pred`, failing after one second.
pub async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Polls `check` every few milliseconds for up to one second.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within one second");
}
