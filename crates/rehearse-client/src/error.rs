use thiserror::Error;

use crate::session::SessionState;
use rehearse_types::ValidationError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot {operation} while session is {state}")]
    InvalidStateTransition {
        state: SessionState,
        operation: &'static str,
    },

    #[error("no active session: tokens have not been issued")]
    NoActiveSession,

    #[error("negotiation error: {0}")]
    Negotiation(String),

    #[error("no active negotiation: an offer must be created first")]
    NoActiveNegotiation,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("network transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("invalid scenario: {0}")]
    Validation(#[from] ValidationError),

    #[error("media error: {0}")]
    Media(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("connect aborted by disconnect")]
    ConnectAborted,
}
