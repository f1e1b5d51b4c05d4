use crate::agent::messages::TaskState;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// An agent is already registered at this endpoint.
    #[error("agent already registered at {0}")]
    Conflict(String),

    #[error("agent not found: {0}")]
    NotFound(String),

    /// The credential could not be verified.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The credential is valid but its principal is not trusted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The remote side answered with something that is not a success envelope.
    /// The raw body is kept for diagnostics.
    #[error("protocol error: {message}")]
    Protocol { message: String, body: Option<String> },

    /// The poll budget ran out before the task reached a terminal state.
    #[error("timed out waiting for task {task_id} after {attempts} attempts")]
    Timeout { task_id: String, attempts: u32 },

    #[error("task state cannot move from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("indexing failed: {0}")]
    Index(String),

    #[error("invalid agent card: {0}")]
    Invalid(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol { message: message.into(), body: None }
    }

    pub fn protocol_with_body(message: impl Into<String>, body: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
            body: Some(body.into()),
        }
    }

    /// True for both credential failures, which callers must not tell apart.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized(_) | Error::Forbidden(_))
    }
}
