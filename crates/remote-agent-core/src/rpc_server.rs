//! Boundary Adapter (C9): reads one line-delimited JSON-RPC request off a
//! freshly accepted connection, dispatches it, writes back one response,
//! and closes. Connections are one-shot by design (spec §6): no method
//! needs a session, so there's nothing to keep a connection alive for.
//!
//! Grounded on `scheduler.rs`'s "stateless handler functions, state lives
//! in the registry" discipline: this module holds no job state itself,
//! only a `AgentContext` bundling the shared registries and timeouts.

use crate::error::AgentError;
use crate::job::{Job, JobSpec};
use crate::plugin::PluginRegistry;
use crate::registry::JobRegistry;
use crate::transfer::{size_probe, tar_transfer, TransferListener};
use remote_agent_proto::rpc::*;
use remote_agent_proto::{CallbackEndpoint, JobId};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, warn};

pub const PROTOCOL_VERSION: &str = "1.0";

pub struct AgentContext {
    pub registry: Arc<JobRegistry>,
    #[allow(dead_code)] // populated by a plugin loader, which is out of scope here
    pub plugins: Arc<PluginRegistry>,
    pub network_timeout: Duration,
    pub transfer_accept_timeout: Duration,
}

/// Serves exactly one request/response exchange on `stream`, then returns.
pub async fn serve_connection(
    ctx: Arc<AgentContext>,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
) -> std::io::Result<()> {
    let mut line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut line).await?;
    }
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_str::<Request>(trimmed) {
        Ok(req) => {
            let id = req.id.clone();
            match handle_request(&ctx, req, peer_addr, &mut stream).await {
                Ok(None) => return Ok(()), // Upload/Download already wrote their own wire response
                Ok(Some(result)) => Response::ok(id, result),
                Err(err) => Response::err(id, to_rpc_error(&err)),
            }
        }
        Err(err) => Response::err(Value::Null, RpcError { code: -32700, message: err.to_string() }),
    };

    let mut out = serde_json::to_string(&response).unwrap_or_else(|_| {
        "{\"jsonrpc\":\"2.0\",\"error\":{\"code\":-32603,\"message\":\"internal error\"},\"id\":null}".into()
    });
    out.push_str("\r\n");
    stream.write_all(out.as_bytes()).await?;
    Ok(())
}

fn to_rpc_error(err: &AgentError) -> RpcError {
    match err.kind() {
        Some(kind) => kind.to_rpc_error(),
        None => RpcError { code: -32603, message: err.to_string() },
    }
}

fn positional<T: serde::de::DeserializeOwned>(params: &[Value]) -> Result<T, AgentError> {
    serde_json::from_value(Value::Array(params.to_vec()))
        .map_err(|e| AgentError::TransferProtocol(format!("bad parameters: {e}")))
}

async fn handle_request(
    ctx: &Arc<AgentContext>,
    req: Request,
    peer_addr: SocketAddr,
    stream: &mut TcpStream,
) -> Result<Option<Value>, AgentError> {
    match req.method.as_str() {
        METHOD_START_JOB => {
            let p: StartJobParams = positional(&req.params)?;
            let job_id = start_job(ctx, p.program_name, p.args.unwrap_or_default(), None, None).await?;
            Ok(Some(json!(job_id.0)))
        }
        METHOD_START_JOB_WITH_NOTIFICATION => {
            let p: StartJobWithNotificationParams = positional(&req.params)?;
            let endpoint = CallbackEndpoint::new(p.callback_address, p.callback_port);
            let completion = endpoint.map(|e| resolve_endpoint(&e, peer_addr)).transpose()?;
            let job_id = start_job(ctx, p.program_name, p.args.unwrap_or_default(), completion, None).await?;
            Ok(Some(json!(job_id.0)))
        }
        METHOD_START_JOB_WITH_PROGRESS => {
            let p: StartJobWithProgressParams = positional(&req.params)?;
            let completion = CallbackEndpoint::new(p.callback_address.clone(), p.callback_port)
                .map(|e| resolve_endpoint(&e, peer_addr))
                .transpose()?;
            let progress = CallbackEndpoint::new(p.callback_address, p.progress_port)
                .map(|e| resolve_endpoint(&e, peer_addr))
                .transpose()?;
            let job_id = start_job(ctx, p.program_name, p.args.unwrap_or_default(), completion, progress).await?;
            Ok(Some(json!(job_id.0)))
        }
        METHOD_IS_JOB_COMPLETE => {
            let (id,): (u64,) = positional(&req.params)?;
            let job = ctx
                .registry
                .try_get(JobId(id))
                .ok_or(AgentError::InvalidJobId(id))?;
            Ok(Some(json!(job.is_done())))
        }
        METHOD_STOP_JOB => {
            let (id,): (u64,) = positional(&req.params)?;
            let killed = ctx.registry.stop_job(JobId(id))?;
            Ok(Some(json!(killed)))
        }
        METHOD_GET_JOB_RESULT => {
            let (id,): (u64,) = positional(&req.params)?;
            let job = ctx
                .registry
                .try_get(JobId(id))
                .ok_or(AgentError::InvalidJobId(id))?;
            let result = job.get_result().await?;
            ctx.registry.try_remove(JobId(id));
            Ok(Some(json!(result)))
        }
        METHOD_GET_ALL_JOBS => {
            let snapshot = ctx.registry.snapshot();
            let map: AllJobsResult = snapshot
                .into_iter()
                .map(|(id, done)| (job_id_key(id), done))
                .collect();
            Ok(Some(json!(map)))
        }
        METHOD_RUN => {
            let p: StartJobParams = positional(&req.params)?;
            start_job(ctx, p.program_name, p.args.unwrap_or_default(), None, None).await?;
            Ok(Some(json!(true)))
        }
        METHOD_RUN_WITH_RESULT => {
            let p: StartJobParams = positional(&req.params)?;
            let (_id, job) = create_job(ctx, p.program_name, p.args.unwrap_or_default(), None, None)?;
            job.wait_until_finished().await;
            let result = job.get_result().await?;
            Ok(Some(json!(result)))
        }
        METHOD_KILL_PROCESS => {
            let p: KillProcessParams = positional(&req.params)?;
            let mut killed_any = false;
            for (id, done) in ctx.registry.snapshot() {
                if done {
                    continue;
                }
                if let Some(job) = ctx.registry.try_get(id) {
                    if job.command == p.process_name {
                        job.kill();
                        killed_any = true;
                    }
                }
            }
            Ok(Some(json!(killed_any)))
        }
        METHOD_UPLOAD => {
            let p: UploadParams = positional(&req.params)?;
            let listener = TransferListener::bind(p.port.unwrap_or(0)).await?;
            let port = listener.port;
            let ack = Response::ok(req.id.clone(), json!(port));
            let mut out = serde_json::to_string(&ack).unwrap();
            out.push_str("\r\n");
            stream.write_all(out.as_bytes()).await?;

            let accept_timeout = ctx.transfer_accept_timeout;
            let dest = std::path::PathBuf::from(p.path);
            let overwrite = p.overwrite;
            tokio::spawn(async move {
                let result = async {
                    let peer = listener.accept_one(accept_timeout).await?;
                    tar_transfer::upload(peer, dest, overwrite).await
                }
                .await;
                if let Err(err) = result {
                    warn!(error = %err, "upload transfer failed");
                }
            });
            Ok(None)
        }
        METHOD_DOWNLOAD => {
            let p: DownloadParams = positional(&req.params)?;
            let entries = size_probe::resolve(&p.path)?;
            let byte_total = size_probe::total_bytes(&entries);
            let listener = TransferListener::bind(p.port.unwrap_or(0)).await?;
            let port = listener.port;
            let result = DownloadResult { port, byte_total };
            let ack = Response::ok(req.id.clone(), json!(result));
            let mut out = serde_json::to_string(&ack).unwrap();
            out.push_str("\r\n");
            stream.write_all(out.as_bytes()).await?;

            let accept_timeout = ctx.transfer_accept_timeout;
            tokio::spawn(async move {
                let result = async {
                    let peer = listener.accept_one(accept_timeout).await?;
                    tar_transfer::download(peer, entries).await
                }
                .await;
                if let Err(err) = result {
                    warn!(error = %err, "download transfer failed");
                }
            });
            Ok(None)
        }
        METHOD_GET_VERSION => Ok(Some(json!(PROTOCOL_VERSION))),
        METHOD_GET_HEARTBEAT => Ok(Some(json!(true))),
        METHOD_GET_CLIENT_IP => Ok(Some(json!(peer_addr.ip().to_string()))),
        other => {
            warn!(method = %other, "unknown RPC method");
            Err(AgentError::TransferProtocol(format!("unknown method {other}")))
        }
    }
}

fn resolve_endpoint(endpoint: &CallbackEndpoint, peer_addr: SocketAddr) -> Result<SocketAddr, AgentError> {
    let host = endpoint.resolve_address(&peer_addr.ip().to_string());
    format!("{host}:{}", endpoint.port)
        .parse()
        .map_err(|_| AgentError::TransferProtocol(format!("bad callback address {host}")))
}

async fn start_job(
    ctx: &Arc<AgentContext>,
    program_name: String,
    args: Vec<String>,
    completion: Option<SocketAddr>,
    progress: Option<SocketAddr>,
) -> Result<JobId, AgentError> {
    let (id, job) = create_job(ctx, program_name, args, completion, progress)?;
    ctx.registry.put(job);
    Ok(id)
}

fn create_job(
    ctx: &Arc<AgentContext>,
    program_name: String,
    args: Vec<String>,
    completion_callback: Option<SocketAddr>,
    progress_endpoint: Option<SocketAddr>,
) -> Result<(JobId, Job), AgentError> {
    let id = ctx.registry.allocate_id();
    info!(job_id = %id, program = %program_name, "starting job");
    let job = Job::create(
        id,
        JobSpec {
            program_name,
            args,
            completion_callback,
            progress_endpoint,
            network_timeout: ctx.network_timeout,
        },
    )?;
    Ok((id, job))
}
