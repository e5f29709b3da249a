//! `AgentError` — the error kinds from spec §7, as a `thiserror` enum.
//!
//! Grounded on `meticulous-worker/src/executor.rs`'s `StartResult`, which
//! likewise distinguishes error *kinds* the caller must act differently
//! on (`ExecutionError` vs `SystemError`) rather than a single opaque
//! `anyhow::Error`. Plumbing failures that don't map onto a named kind are
//! wrapped in `Internal` via `anyhow::Error`'s blanket conversions at the
//! call site, mirroring the teacher's use of bare `anyhow` for startup and
//! one-off glue.

use remote_agent_proto::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("no job with id {0}")]
    InvalidJobId(u64),

    #[error("job {0} has not finished")]
    JobNotFinished(u64),

    #[error("job {0} has already finished")]
    JobAlreadyFinished(u64),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no peer connected within the transfer timeout")]
    TransferTimeout,

    #[error("transfer protocol error: {0}")]
    TransferProtocol(String),

    #[error("failed to write to output sink: {0}")]
    SinkFailure(#[source] std::io::Error),

    #[error("completion callback endpoint unreachable after retries")]
    CallbackUnreachable,

    #[error("operation unsupported on this platform")]
    PlatformUnsupported,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AgentError::InvalidJobId(_) => Some(ErrorKind::InvalidJobId),
            AgentError::JobNotFinished(_) => Some(ErrorKind::JobNotFinished),
            AgentError::JobAlreadyFinished(_) => Some(ErrorKind::JobAlreadyFinished),
            AgentError::SpawnFailed(_) => Some(ErrorKind::SpawnFailed),
            AgentError::PermissionDenied(_) => Some(ErrorKind::PermissionDenied),
            AgentError::TransferTimeout => Some(ErrorKind::TransferTimeout),
            AgentError::TransferProtocol(_) => Some(ErrorKind::TransferProtocol),
            AgentError::SinkFailure(_) => Some(ErrorKind::SinkFailure),
            AgentError::CallbackUnreachable => Some(ErrorKind::CallbackUnreachable),
            AgentError::PlatformUnsupported => Some(ErrorKind::PlatformUnsupported),
            AgentError::Internal(_) => None,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Internal(err.into())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
