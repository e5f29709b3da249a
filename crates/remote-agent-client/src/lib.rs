//! Client library for `remote-agent`.
//!
//! Grounded on `maelstrom-client`'s shape at the level of "one call in,
//! one call out, state lives behind a handle the caller holds onto" but
//! simplified from its gRPC/tonic dispatcher-thread design down to what a
//! line-delimited JSON-RPC-over-TCP protocol actually needs: each call
//! opens its own short-lived connection (connections aren't kept alive on
//! the agent side either, so there is no persistent channel to multiplex
//! over). `CallbackListener` plays the role of the teacher's background
//! process: a long-lived task the caller starts once and then polls.

use remote_agent_proto::error::ErrorKind;
use remote_agent_proto::rpc::{
    DownloadResult, Request, Response, AllJobsResult,
    METHOD_DOWNLOAD, METHOD_GET_ALL_JOBS, METHOD_GET_CLIENT_IP, METHOD_GET_HEARTBEAT,
    METHOD_GET_JOB_RESULT, METHOD_GET_VERSION, METHOD_IS_JOB_COMPLETE, METHOD_KILL_PROCESS,
    METHOD_RUN, METHOD_RUN_WITH_RESULT, METHOD_START_JOB, METHOD_START_JOB_WITH_NOTIFICATION,
    METHOD_START_JOB_WITH_PROGRESS, METHOD_STOP_JOB, METHOD_UPLOAD,
};
use remote_agent_proto::{wire, JobId};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error talking to the agent: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response from agent: {0}")]
    Protocol(String),
    #[error("agent reported an error: {0:?} ({1})")]
    Remote(Option<ErrorKind>, String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// One call site per RPC method, each opening its own connection.
pub struct RemoteAgentClient {
    addr: SocketAddr,
    network_timeout: Duration,
}

impl RemoteAgentClient {
    pub fn new(addr: SocketAddr, network_timeout: Duration) -> Self {
        RemoteAgentClient { addr, network_timeout }
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let stream = tokio::time::timeout(self.network_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| ClientError::Protocol("connect timed out".into()))??;
        self.call_on(stream, method, params).await
    }

    async fn call_on(&self, mut stream: TcpStream, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = Request::new(method, params, json!(1));
        let mut line = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        line.push_str("\r\n");
        stream.write_all(line.as_bytes()).await?;

        let mut response_line = String::new();
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut response_line).await?;

        let response: Response = serde_json::from_str(response_line.trim_end())
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        if let Some(err) = response.error {
            let kind = ErrorKind::from_code(err.code);
            return Err(ClientError::Remote(kind, err.message));
        }
        response
            .result
            .ok_or_else(|| ClientError::Protocol("response had neither result nor error".into()))
    }

    async fn decode<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    pub async fn start_job(&self, program_name: &str, args: Vec<String>) -> Result<JobId> {
        let id: u64 = self
            .decode(METHOD_START_JOB, vec![json!(program_name), json!(args)])
            .await?;
        Ok(JobId(id))
    }

    pub async fn start_job_with_notification(
        &self,
        callback_address: Option<String>,
        callback_port: i32,
        program_name: &str,
        args: Vec<String>,
    ) -> Result<JobId> {
        let id: u64 = self
            .decode(
                METHOD_START_JOB_WITH_NOTIFICATION,
                vec![
                    json!(callback_address),
                    json!(callback_port),
                    json!(program_name),
                    json!(args),
                ],
            )
            .await?;
        Ok(JobId(id))
    }

    pub async fn start_job_with_progress(
        &self,
        callback_address: Option<String>,
        callback_port: i32,
        progress_port: i32,
        program_name: &str,
        args: Vec<String>,
    ) -> Result<JobId> {
        let id: u64 = self
            .decode(
                METHOD_START_JOB_WITH_PROGRESS,
                vec![
                    json!(callback_address),
                    json!(callback_port),
                    json!(progress_port),
                    json!(program_name),
                    json!(args),
                ],
            )
            .await?;
        Ok(JobId(id))
    }

    pub async fn is_job_complete(&self, id: JobId) -> Result<bool> {
        self.decode(METHOD_IS_JOB_COMPLETE, vec![json!(id.0)]).await
    }

    pub async fn stop_job(&self, id: JobId) -> Result<bool> {
        self.decode(METHOD_STOP_JOB, vec![json!(id.0)]).await
    }

    pub async fn get_job_result(&self, id: JobId) -> Result<String> {
        self.decode(METHOD_GET_JOB_RESULT, vec![json!(id.0)]).await
    }

    pub async fn get_all_jobs(&self) -> Result<AllJobsResult> {
        self.decode(METHOD_GET_ALL_JOBS, vec![]).await
    }

    pub async fn run(&self, program_name: &str, args: Vec<String>) -> Result<bool> {
        self.decode(METHOD_RUN, vec![json!(program_name), json!(args)]).await
    }

    pub async fn run_with_result(&self, program_name: &str, args: Vec<String>) -> Result<String> {
        self.decode(METHOD_RUN_WITH_RESULT, vec![json!(program_name), json!(args)])
            .await
    }

    pub async fn kill_process(&self, process_name: &str) -> Result<bool> {
        self.decode(METHOD_KILL_PROCESS, vec![json!(process_name)]).await
    }

    pub async fn get_version(&self) -> Result<String> {
        self.decode(METHOD_GET_VERSION, vec![]).await
    }

    pub async fn get_heartbeat(&self) -> Result<bool> {
        self.decode(METHOD_GET_HEARTBEAT, vec![]).await
    }

    pub async fn get_client_ip(&self) -> Result<String> {
        self.decode(METHOD_GET_CLIENT_IP, vec![]).await
    }

    /// Uploads `local_archive_root`'s contents to `remote_path` on the
    /// agent. Opens the initial control connection to learn the
    /// ephemeral transfer port, then a second connection to stream the
    /// tar payload and read back the byte-count trailer.
    pub async fn upload(
        &self,
        remote_path: &str,
        overwrite: bool,
        tar_payload: &[u8],
    ) -> Result<u64> {
        let port: u16 = self
            .decode(
                METHOD_UPLOAD,
                vec![json!(remote_path), json!(overwrite), json!(None::<u16>)],
            )
            .await?;

        let mut transfer = TcpStream::connect((self.addr.ip(), port)).await?;
        transfer.write_all(tar_payload).await?;
        transfer.shutdown().await?;

        let mut trailer = String::new();
        let mut reader = BufReader::new(&mut transfer);
        reader.read_line(&mut trailer).await?;
        trailer
            .trim()
            .parse()
            .map_err(|_| ClientError::Protocol(format!("bad upload trailer: {trailer:?}")))
    }

    /// Requests a Download of `remote_path`, then streams the resulting
    /// tar archive back in full.
    pub async fn download(&self, remote_path: &str) -> Result<(DownloadResult, Vec<u8>)> {
        let result: DownloadResult = self
            .decode(METHOD_DOWNLOAD, vec![json!(remote_path), json!(None::<u16>)])
            .await?;

        let mut transfer = TcpStream::connect((self.addr.ip(), result.port)).await?;
        let mut payload = Vec::new();
        transfer.read_to_end(&mut payload).await?;
        Ok((result, payload))
    }
}

/// Listens for completion callbacks (`JOB <id> COMPLETED`) fired by
/// `StartJobWithNotification`/`StartJobWithProgress`. One connection per
/// notification, matching how the agent sends them.
pub struct CallbackListener {
    pub port: u16,
    rx: mpsc::UnboundedReceiver<JobId>,
}

impl CallbackListener {
    pub async fn bind(requested_port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", requested_port)).await?;
        let port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "callback listener accept failed");
                        continue;
                    }
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(id) = read_callback(stream).await {
                        debug!(job_id = %id, %peer, "received completion callback");
                        let _ = tx.send(id);
                    }
                });
            }
        });

        Ok(CallbackListener { port, rx })
    }

    pub async fn recv(&mut self) -> Option<JobId> {
        self.rx.recv().await
    }
}

async fn read_callback(stream: TcpStream) -> Option<JobId> {
    let mut line = String::new();
    let mut reader = BufReader::new(stream);
    reader.read_line(&mut line).await.ok()?;
    wire::parse_callback_message(line.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_agent_core::registry::JobRegistry;
    use remote_agent_core::{plugin::PluginRegistry, rpc_server, AgentContext};
    use std::sync::Arc;
    use tokio::net::TcpListener as TestListener;

    async fn spawn_agent() -> SocketAddr {
        let listener = TestListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = Arc::new(AgentContext {
            registry: Arc::new(JobRegistry::new()),
            plugins: Arc::new(PluginRegistry::new()),
            network_timeout: Duration::from_secs(2),
            transfer_accept_timeout: Duration::from_secs(2),
        });
        tokio::spawn(async move {
            loop {
                let (stream, peer) = listener.accept().await.unwrap();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _ = rpc_server::serve_connection(ctx, stream, peer).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn start_job_and_get_result_round_trip() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));

        let id = client.start_job("sh", vec!["-c".into(), "echo hi".into()]).await.unwrap();
        loop {
            if client.is_job_complete(id).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let result = client.get_job_result(id).await.unwrap();
        assert_eq!(result, "hi\n");
    }

    #[tokio::test]
    async fn get_version_and_heartbeat() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));
        assert_eq!(client.get_version().await.unwrap(), rpc_server::PROTOCOL_VERSION);
        assert!(client.get_heartbeat().await.unwrap());
    }

    #[tokio::test]
    async fn invalid_job_id_surfaces_as_remote_error() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));
        let err = client.is_job_complete(JobId(999)).await.unwrap_err();
        match err {
            ClientError::Remote(Some(ErrorKind::InvalidJobId), _) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_job_removes_it_from_the_registry() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));

        let id = client.start_job("sh", vec!["-c".into(), "sleep 30".into()]).await.unwrap();
        assert!(client.stop_job(id).await.unwrap());

        let err = client.is_job_complete(id).await.unwrap_err();
        match err {
            ClientError::Remote(Some(ErrorKind::InvalidJobId), _) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_job_on_finished_job_fails_without_removing_it() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));

        let id = client.start_job("true", vec![]).await.unwrap();
        loop {
            if client.is_job_complete(id).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let err = client.stop_job(id).await.unwrap_err();
        match err {
            ClientError::Remote(Some(ErrorKind::JobAlreadyFinished), _) => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.get_job_result(id).await.is_ok());
    }

    #[tokio::test]
    async fn get_job_result_removes_the_job_from_the_registry() {
        let addr = spawn_agent().await;
        let client = RemoteAgentClient::new(addr, Duration::from_secs(2));

        let id = client.start_job("sh", vec!["-c".into(), "echo hi".into()]).await.unwrap();
        loop {
            if client.is_job_complete(id).await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(client.get_job_result(id).await.unwrap(), "hi\n");

        let err = client.is_job_complete(id).await.unwrap_err();
        match err {
            ClientError::Remote(Some(ErrorKind::InvalidJobId), _) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
