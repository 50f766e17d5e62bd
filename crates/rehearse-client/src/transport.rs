//! Peer connection negotiation.
//!
//! [`NegotiationTransport`] drives one platform peer connection through a
//! single offer/answer exchange. It owns the peer handle outright and only
//! exposes derived state: the connection state, and a channel of
//! [`PeerEvent`]s carrying locally discovered candidates, state changes and
//! the inbound remote stream.
//!
//! Remote candidates received before the answer is applied are buffered and
//! flushed in arrival order once it has been.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::config::IceServer;
use crate::error::ClientError;
use crate::media::{MediaStream, MediaTrack};
use rehearse_types::{IceCandidate, SdpType, SessionDescription};

/// Connection state reported by the platform peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// Whether the state means media has stopped flowing.
    pub fn is_interrupted(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

/// What the peer reports, in the order it happened.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    ConnectionState(PeerConnectionState),
    RemoteStream(MediaStream),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

/// A platform peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: Arc<dyn MediaTrack>, stream: &MediaStream) -> Result<(), ClientError>;
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription, ClientError>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<(), ClientError>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), ClientError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError>;
    /// Tracks currently attached as outbound senders.
    fn sender_tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
    fn connection_state(&self) -> PeerConnectionState;
    fn close(&self);
}

/// Builds peer connections that report through `events`.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>, ClientError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// `create_offer` has claimed this transport.
    Offering,
    /// Remote description applied; candidates go straight to the peer.
    Answered,
    Closed,
}

#[derive(Default)]
struct Negotiation {
    phase: Phase,
    peer: Option<Arc<dyn PeerConnection>>,
    pending_candidates: VecDeque<IceCandidate>,
}

pub struct NegotiationTransport {
    factory: Arc<dyn PeerConnectionFactory>,
    ice_servers: Vec<IceServer>,
    negotiation: Mutex<Negotiation>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
}

impl fmt::Debug for NegotiationTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = self.lock().phase;
        f.debug_struct("NegotiationTransport")
            .field("phase", &phase)
            .field("ice_servers", &self.ice_servers)
            .finish_non_exhaustive()
    }
}

impl NegotiationTransport {
    pub fn new(factory: Arc<dyn PeerConnectionFactory>, ice_servers: Vec<IceServer>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            ice_servers,
            negotiation: Mutex::new(Negotiation::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Hands out the peer event receiver. Only the first caller gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        match self.events_rx.lock() {
            Ok(mut rx) => rx.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Negotiation> {
        match self.negotiation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Builds the peer, attaches `stream`'s tracks and returns the local
    /// offer, already applied as the local description.
    ///
    /// # Errors
    ///
    /// [`ClientError::Negotiation`] if this transport has already started a
    /// negotiation, even one still in flight.
    pub async fn create_offer(&self, stream: &MediaStream) -> Result<SessionDescription, ClientError> {
        let peer = {
            let mut negotiation = self.lock();
            if negotiation.phase != Phase::Idle {
                return Err(ClientError::Negotiation(
                    "peer connection already exists for this transport".to_string(),
                ));
            }
            let peer = self.factory.create(&self.ice_servers, self.events_tx.clone())?;
            negotiation.phase = Phase::Offering;
            negotiation.peer = Some(Arc::clone(&peer));
            peer
        };

        for track in stream.tracks() {
            peer.add_track(Arc::clone(track), stream)?;
        }

        let offer = peer
            .create_offer(OfferOptions {
                offer_to_receive_audio: true,
                offer_to_receive_video: false,
            })
            .await?;
        peer.set_local_description(offer.clone()).await?;
        tracing::debug!(tracks = stream.tracks().len(), "local offer created");
        Ok(offer)
    }

    /// Applies the remote answer, then flushes buffered remote candidates.
    ///
    /// Every buffered candidate is offered to the peer even if an earlier
    /// one is rejected, and the transport moves to applying candidates
    /// directly either way.
    ///
    /// # Errors
    ///
    /// The first error from the peer. A rejected candidate does not hold
    /// back the ones queued behind it.
    pub async fn accept_answer(&self, answer: SessionDescription) -> Result<(), ClientError> {
        if answer.kind != SdpType::Answer {
            return Err(ClientError::Negotiation(format!(
                "expected an answer, got {}",
                answer.kind
            )));
        }
        let peer = self.active_peer()?;
        peer.set_remote_description(answer).await?;

        // Pop one at a time and switch phase only once the queue is empty
        // under the lock, so a candidate arriving mid-flush lands behind the
        // earlier ones.
        let mut first_error = None;
        let mut flushed = 0usize;
        loop {
            let next = {
                let mut negotiation = self.lock();
                if negotiation.phase == Phase::Closed {
                    return Ok(());
                }
                match negotiation.pending_candidates.pop_front() {
                    Some(candidate) => candidate,
                    None => {
                        negotiation.phase = Phase::Answered;
                        break;
                    }
                }
            };
            flushed += 1;
            if let Err(err) = peer.add_ice_candidate(next).await {
                tracing::warn!(error = %err, "peer rejected a buffered remote candidate");
                first_error.get_or_insert(err);
            }
        }
        if flushed > 0 {
            tracing::debug!(count = flushed, "flushed buffered remote candidates");
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Applies a remote candidate, or buffers it until the answer is in.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError> {
        let peer = {
            let mut negotiation = self.lock();
            let Some(peer) = negotiation.peer.clone() else {
                return Err(ClientError::NoActiveNegotiation);
            };
            if negotiation.phase != Phase::Answered {
                negotiation.pending_candidates.push_back(candidate);
                return Ok(());
            }
            peer
        };
        peer.add_ice_candidate(candidate).await
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        let negotiation = self.lock();
        match (&negotiation.peer, negotiation.phase) {
            (_, Phase::Closed) => PeerConnectionState::Closed,
            (Some(peer), _) => peer.connection_state(),
            (None, _) => PeerConnectionState::New,
        }
    }

    /// Stops outbound tracks and releases the peer. Idempotent.
    pub fn close(&self) {
        let peer = {
            let mut negotiation = self.lock();
            negotiation.phase = Phase::Closed;
            negotiation.pending_candidates.clear();
            negotiation.peer.take()
        };
        if let Some(peer) = peer {
            for track in peer.sender_tracks() {
                track.stop();
            }
            peer.close();
            tracing::debug!("peer connection closed");
        }
    }

    fn active_peer(&self) -> Result<Arc<dyn PeerConnection>, ClientError> {
        self.lock()
            .peer
            .clone()
            .ok_or(ClientError::NoActiveNegotiation)
    }
}
