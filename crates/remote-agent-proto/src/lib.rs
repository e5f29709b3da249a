//! Wire types shared between the agent and its client library.
//!
//! This crate only knows about bytes-on-the-wire: JSON-RPC 2.0 request/
//! response envelopes, the method-specific parameter/result shapes listed
//! in spec §6, and the small ASCII sub-protocols used on the completion
//! and transfer side channels. It has no knowledge of jobs, processes, or
//! transfers as running things — see `remote-agent-core` for that.

pub mod error;
pub mod rpc;
pub mod wire;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A job id. Monotonically increasing, unique for the lifetime of one
/// agent process (spec §3, §9 "global mutable counter").
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        JobId(value)
    }
}

/// `(address, port)` pair naming a socket the agent should dial back to.
///
/// An absent address means "use the address of the client's own RPC
/// connection" (spec §3). A zero or negative port disables the feature
/// entirely, which callers express by leaving this whole value `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackEndpoint {
    pub address: Option<String>,
    pub port: i32,
}

impl CallbackEndpoint {
    pub fn new(address: Option<String>, port: i32) -> Option<Self> {
        if port <= 0 {
            None
        } else {
            Some(CallbackEndpoint { address, port })
        }
    }

    pub fn resolve_address(&self, caller_addr: &str) -> String {
        self.address.clone().unwrap_or_else(|| caller_addr.to_string())
    }
}
