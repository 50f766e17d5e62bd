//! In-memory session store.
//!
//! The session map is guarded by a `std::sync::RwLock` held only for the
//! lookup or insert; each record has its own `Mutex`, so mutations on one
//! session never wait on another session's record. No lock is held across
//! an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use rehearse_types::{IceCandidate, SessionDescription};
use uuid::Uuid;

use crate::answer::{AnswerSynthesizer, TemplateAnswer};
use crate::error::SignalingError;

/// Negotiation state retained for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalingRecord {
    /// Last offer submitted, `None` until the first negotiation.
    pub offer: Option<SessionDescription>,
    /// Answer synthesized for [`Self::offer`].
    pub answer: Option<SessionDescription>,
    /// Candidates in submission order.
    pub candidates: Vec<IceCandidate>,
}

type RecordMap = HashMap<String, Arc<Mutex<SignalingRecord>>>;

/// Keyed store of [`SignalingRecord`]s. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SignalingStore {
    sessions: Arc<RwLock<RecordMap>>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
}

impl fmt::Debug for SignalingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingStore")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl Default for SignalingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingStore {
    /// Creates an empty store answering with [`TemplateAnswer`].
    pub fn new() -> Self {
        Self::with_synthesizer(Arc::new(TemplateAnswer))
    }

    pub fn with_synthesizer(synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            synthesizer,
        }
    }

    /// Allocates a fresh session id with an empty record.
    pub fn create_session(&self) -> Result<String, SignalingError> {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .map_err(|_| SignalingError::LockPoisoned)?
            .insert(session_id.clone(), Arc::default());
        tracing::debug!(session_id = %session_id, "signaling session created");
        Ok(session_id)
    }

    /// Stores `offer` and a synthesized answer, returning the answer.
    ///
    /// Creates the record when the id is unknown. A repeated call replaces
    /// the previous offer and answer; candidates are kept.
    pub fn submit_offer(
        &self,
        session_id: &str,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let record = self.get_or_insert(session_id)?;
        let answer = self.synthesizer.answer(session_id, &offer);

        let mut record = record.lock().map_err(|_| SignalingError::LockPoisoned)?;
        if record.offer.is_some() {
            tracing::debug!(session_id, "replacing previous offer");
        }
        record.offer = Some(offer);
        record.answer = Some(answer.clone());
        tracing::info!(session_id, "offer stored, answer generated");
        Ok(answer)
    }

    /// Appends a candidate to an existing session.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::SessionNotFound`] if the id is unknown.
    pub fn submit_candidate(
        &self,
        session_id: &str,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        let record = self
            .get(session_id)?
            .ok_or_else(|| SignalingError::SessionNotFound(session_id.to_string()))?;
        let mut record = record.lock().map_err(|_| SignalingError::LockPoisoned)?;
        record.candidates.push(candidate);
        tracing::debug!(
            session_id,
            count = record.candidates.len(),
            "candidate appended"
        );
        Ok(())
    }

    /// Returns a snapshot of the record for `session_id`.
    pub fn record(&self, session_id: &str) -> Result<Option<SignalingRecord>, SignalingError> {
        match self.get(session_id)? {
            Some(record) => {
                let record = record.lock().map_err(|_| SignalingError::LockPoisoned)?;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    /// Number of sessions currently held. Returns 0 if the map is poisoned.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    fn get(&self, session_id: &str) -> Result<Option<Arc<Mutex<SignalingRecord>>>, SignalingError> {
        let sessions = self.sessions.read().map_err(|_| SignalingError::LockPoisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn get_or_insert(&self, session_id: &str) -> Result<Arc<Mutex<SignalingRecord>>, SignalingError> {
        if let Some(record) = self.get(session_id)? {
            return Ok(record);
        }
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SignalingError::LockPoisoned)?;
        Ok(sessions.entry(session_id.to_string()).or_default().clone())
    }
}
