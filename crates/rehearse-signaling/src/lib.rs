//! Signaling exchange for Rehearse voice sessions.
//!
//! A bare relay of negotiation state keyed by session id: each session holds
//! at most one offer/answer pair and an append-only list of connectivity
//! candidates submitted by the client. Candidates are retained, never
//! forwarded; distributing them to the remote peer is left to whatever sits
//! behind the store.
//!
//! The answer returned for an offer comes from an [`AnswerSynthesizer`]. The
//! default [`TemplateAnswer`] emits a fixed receive-only audio description
//! that does not look at the offer; deployments needing interoperable
//! negotiation plug in a real SDP responder.
//!
//! No authentication, rate limiting, or candidate deduplication is done here.

mod answer;
mod error;
mod store;

pub use answer::{AnswerSynthesizer, TemplateAnswer, TEMPLATE_ANSWER_SDP};
pub use error::SignalingError;
pub use store::{SignalingRecord, SignalingStore};
