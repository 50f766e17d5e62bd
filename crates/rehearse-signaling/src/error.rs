//! Error types for the signaling store.

/// Errors that can occur during signaling operations.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// No record exists for the given session id.
    #[error("signaling session not found: {0}")]
    SessionNotFound(String),

    /// A lock guarding session state was poisoned by a panicked thread.
    #[error("signaling store lock poisoned")]
    LockPoisoned,
}
