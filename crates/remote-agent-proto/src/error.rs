//! The stable set of error kinds an RPC call can fail with (spec §7).
//!
//! `remote-agent-core` owns the richer `AgentError` (with `anyhow`
//! contexts attached); this is the flattened, wire-stable projection of it
//! that both sides of the RPC boundary agree on.

use crate::rpc::RpcError;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ErrorKind {
    #[error("invalid job id")]
    InvalidJobId,
    #[error("job has not finished")]
    JobNotFinished,
    #[error("job has already finished")]
    JobAlreadyFinished,
    #[error("failed to spawn process")]
    SpawnFailed,
    #[error("permission denied")]
    PermissionDenied,
    #[error("transfer timed out waiting for a peer")]
    TransferTimeout,
    #[error("transfer protocol error")]
    TransferProtocol,
    #[error("failed to write to output sink")]
    SinkFailure,
    #[error("completion callback endpoint unreachable")]
    CallbackUnreachable,
    #[error("operation unsupported on this platform")]
    PlatformUnsupported,
}

impl ErrorKind {
    /// JSON-RPC error codes in the implementation-defined range
    /// (-32000..-32099 per the JSON-RPC 2.0 spec), one per kind.
    pub const fn code(self) -> i64 {
        match self {
            ErrorKind::InvalidJobId => -32000,
            ErrorKind::JobNotFinished => -32001,
            ErrorKind::JobAlreadyFinished => -32002,
            ErrorKind::SpawnFailed => -32003,
            ErrorKind::PermissionDenied => -32004,
            ErrorKind::TransferTimeout => -32005,
            ErrorKind::TransferProtocol => -32006,
            ErrorKind::SinkFailure => -32007,
            ErrorKind::CallbackUnreachable => -32008,
            ErrorKind::PlatformUnsupported => -32009,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            -32000 => ErrorKind::InvalidJobId,
            -32001 => ErrorKind::JobNotFinished,
            -32002 => ErrorKind::JobAlreadyFinished,
            -32003 => ErrorKind::SpawnFailed,
            -32004 => ErrorKind::PermissionDenied,
            -32005 => ErrorKind::TransferTimeout,
            -32006 => ErrorKind::TransferProtocol,
            -32007 => ErrorKind::SinkFailure,
            -32008 => ErrorKind::CallbackUnreachable,
            -32009 => ErrorKind::PlatformUnsupported,
            _ => return None,
        })
    }

    pub fn to_rpc_error(self) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<ErrorKind> for RpcError {
    fn from(kind: ErrorKind) -> Self {
        kind.to_rpc_error()
    }
}
