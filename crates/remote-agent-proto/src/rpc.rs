//! JSON-RPC 2.0 envelope and the method-specific payloads from spec §6.
//!
//! Params are positional (spec §6: "Positional parameters only"), so each
//! request's `params` is a JSON array. The per-method structs below know
//! how to read themselves out of that array; they are not derived
//! `Deserialize` impls over an object.

use crate::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const METHOD_START_JOB: &str = "StartJob";
pub const METHOD_START_JOB_WITH_NOTIFICATION: &str = "StartJobWithNotification";
pub const METHOD_START_JOB_WITH_PROGRESS: &str = "StartJobWithProgress";
pub const METHOD_IS_JOB_COMPLETE: &str = "IsJobComplete";
pub const METHOD_STOP_JOB: &str = "StopJob";
pub const METHOD_GET_JOB_RESULT: &str = "GetJobResult";
pub const METHOD_GET_ALL_JOBS: &str = "GetAllJobs";
pub const METHOD_RUN: &str = "Run";
pub const METHOD_RUN_WITH_RESULT: &str = "RunWithResult";
pub const METHOD_KILL_PROCESS: &str = "KillProcess";
pub const METHOD_UPLOAD: &str = "Upload";
pub const METHOD_DOWNLOAD: &str = "Download";
pub const METHOD_GET_VERSION: &str = "GetVersion";
pub const METHOD_GET_HEARTBEAT: &str = "GetHeartbeat";
pub const METHOD_GET_CLIENT_IP: &str = "GetClientIP";

/// A single-line JSON-RPC 2.0 request, terminated on the wire by `\r\n`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: RpcVersion,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub id: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<Value>) -> Self {
        Request {
            jsonrpc: RpcVersion,
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

/// A single-line JSON-RPC 2.0 response, terminated on the wire by `\r\n`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: RpcVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Response {
            jsonrpc: RpcVersion,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Response {
            jsonrpc: RpcVersion,
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Always serializes/deserializes as the literal string `"2.0"`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RpcVersion;

impl Serialize for RpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for RpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(RpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version `{s}`"
            )))
        }
    }
}

/// `StartJob` / `Run` / `RunWithResult` share this shape: a program and an
/// optional argument list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartJobParams {
    pub program_name: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartJobWithNotificationParams {
    pub callback_address: Option<String>,
    pub callback_port: i32,
    pub program_name: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartJobWithProgressParams {
    pub callback_address: Option<String>,
    pub callback_port: i32,
    pub progress_port: i32,
    pub program_name: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KillProcessParams {
    pub process_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadParams {
    pub path: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadParams {
    pub path: String,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadResult {
    pub port: u16,
    pub byte_total: u64,
}

/// `GetAllJobs` result: a snapshot map from job id to completion flag.
/// JSON object keys must be strings, so ids are rendered as decimal text;
/// `remote-agent-client` parses them back into `JobId`.
pub type AllJobsResult = BTreeMap<String, bool>;

pub fn job_id_key(id: JobId) -> String {
    id.0.to_string()
}
