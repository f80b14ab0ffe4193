// Muse Error Types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuseError {
    /// Poll or dispatch failure; terminal for the session, no automatic retry
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error reported by the pipeline itself; surfaced verbatim
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A workflow is already running for this editing context
    #[error("A session is already running")]
    SessionBusy,

    /// An apply/approve/reject is already in flight for the pending proposal
    #[error("An apply operation is already in flight")]
    ApplyInFlight,

    #[error("No proposal is pending review")]
    NoPendingProposal,

    #[error("No active session")]
    NoActiveSession,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for MuseError {
    fn from(err: reqwest::Error) -> Self {
        MuseError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MuseError>;
