//! Job (C4): couples one spawned child process with its Line Pump and
//! Output Router, and fires the completion callback once both the
//! process has exited and its output has fully drained.
//!
//! Grounded on `executor.rs` + `reaper.rs`'s reap-then-notify sequencing,
//! reshaped around the explicit drain -> close -> callback ordering
//! spec §9 calls for: "done" (child exited) and "drained" (output fully
//! delivered) are tracked as two independent signals so `IsJobComplete`
//! can answer as soon as the child exits, while `GetJobResult` waits for
//! the extra drain step.

use crate::error::{AgentError, Result};
use crate::pump::{LinePump, PumpEvent};
use crate::sink::{self, Sink, SinkTag, WriteOutcome};
use crate::spawner::Spawner;
use remote_agent_proto::{wire, JobId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, warn};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Exited,
    Killed,
}

struct JobInner {
    id: JobId,
    state: Mutex<JobState>,
    exit_code: AtomicI32,
    backup_path: Mutex<Option<PathBuf>>,
    sink_tag: Mutex<SinkTag>,
    result_buffer: Mutex<String>,
    done_tx: watch::Sender<bool>,
    drained_tx: watch::Sender<bool>,
}

impl JobInner {
    fn new(id: JobId) -> (Self, watch::Receiver<bool>, watch::Receiver<bool>) {
        let (done_tx, done_rx) = watch::channel(false);
        let (drained_tx, drained_rx) = watch::channel(false);
        (
            JobInner {
                id,
                state: Mutex::new(JobState::Running),
                exit_code: AtomicI32::new(-1),
                backup_path: Mutex::new(None),
                sink_tag: Mutex::new(SinkTag::InMemory),
                result_buffer: Mutex::new(String::new()),
                done_tx,
                drained_tx,
            },
            done_rx,
            drained_rx,
        )
    }

    fn set_exited(&self, state: JobState, exit_code: i32) {
        *self.state.lock().unwrap() = state;
        self.exit_code.store(exit_code, Ordering::Release);
        let _ = self.done_tx.send(true);
    }
}

/// A running or finished job. Cheap to clone: all mutable state lives
/// behind the shared `JobInner`.
#[derive(Clone)]
pub struct Job {
    inner: std::sync::Arc<JobInner>,
    kill_notify: std::sync::Arc<Notify>,
    done_rx: watch::Receiver<bool>,
    drained_rx: watch::Receiver<bool>,
    pub command: String,
    pub args: Vec<String>,
}

pub struct JobSpec {
    pub program_name: String,
    pub args: Vec<String>,
    pub completion_callback: Option<SocketAddr>,
    pub progress_endpoint: Option<SocketAddr>,
    pub network_timeout: Duration,
}

impl Job {
    pub fn create(id: JobId, spec: JobSpec) -> Result<Job> {
        let mut child = Spawner::spawn(&spec.program_name, &spec.args)?;
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        let (pump, _h_out, _h_err) = LinePump::spawn(stdout, stderr);

        let (inner, done_rx, drained_rx) = JobInner::new(id);
        let inner = std::sync::Arc::new(inner);
        let kill_notify = std::sync::Arc::new(Notify::new());

        let command_line = if spec.args.is_empty() {
            spec.program_name.clone()
        } else {
            format!("{} {}", spec.program_name, spec.args.join(" "))
        };

        let wait_inner = inner.clone();
        let wait_kill_notify = kill_notify.clone();
        let wait_handle = tokio::spawn(async move {
            let (state, code) = wait_for_child(child, wait_kill_notify).await;
            wait_inner.set_exited(state, code);
        });

        let drain_inner = inner.clone();
        let drain_handle = tokio::spawn(async move {
            drain_into_sink(
                drain_inner,
                pump,
                spec.progress_endpoint,
                command_line,
                spec.network_timeout,
            )
            .await;
        });

        let completion = spec.completion_callback;
        let network_timeout = spec.network_timeout;
        let finalize_inner = inner.clone();
        tokio::spawn(async move {
            let _ = wait_handle.await;
            let _ = drain_handle.await;
            if let Some(addr) = completion {
                send_completion_callback(addr, finalize_inner.id, network_timeout).await;
            }
        });

        Ok(Job {
            inner,
            kill_notify,
            done_rx,
            drained_rx,
            command: spec.program_name,
            args: spec.args,
        })
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// True as soon as the child process has exited, independent of
    /// whether its captured output has finished draining.
    pub fn is_done(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), JobState::Running)
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock().unwrap()
    }

    pub fn sink_tag(&self) -> SinkTag {
        *self.inner.sink_tag.lock().unwrap()
    }

    pub fn backup_path(&self) -> Option<PathBuf> {
        self.inner.backup_path.lock().unwrap().clone()
    }

    pub fn kill(&self) {
        self.kill_notify.notify_one();
    }

    pub fn get_exit_code(&self) -> Result<i32> {
        if !self.is_done() {
            return Err(AgentError::JobNotFinished(self.inner.id.0));
        }
        Ok(self.inner.exit_code.load(Ordering::Acquire))
    }

    /// Waits for the child to exit, then for its output to finish
    /// draining, and returns the accumulated in-memory result text
    /// (empty for the file/streaming sink variants).
    pub async fn get_result(&self) -> Result<String> {
        if !self.is_done() {
            return Err(AgentError::JobNotFinished(self.inner.id.0));
        }
        self.wait_drained().await;
        Ok(self.inner.result_buffer.lock().unwrap().clone())
    }

    /// Blocks until the job is fully done (process exited and output
    /// drained). Used by the blocking `RunWithResult` RPC.
    pub async fn wait_until_finished(&self) {
        let mut rx = self.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.wait_drained().await;
    }

    async fn wait_drained(&self) {
        let mut rx = self.drained_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

async fn wait_for_child(
    mut child: tokio::process::Child,
    kill_notify: std::sync::Arc<Notify>,
) -> (JobState, i32) {
    let mut killed = false;
    let status = loop {
        tokio::select! {
            _ = kill_notify.notified() => {
                killed = true;
                if let Err(err) = child.start_kill() {
                    warn!(error = %err, "failed to signal child for kill");
                }
            }
            res = child.wait() => {
                break res;
            }
        }
    };

    let code = status
        .ok()
        .and_then(|s| s.code())
        .unwrap_or(-1);

    if killed {
        (JobState::Killed, code)
    } else {
        (JobState::Exited, code)
    }
}

async fn drain_into_sink(
    inner: std::sync::Arc<JobInner>,
    mut pump: LinePump,
    progress_endpoint: Option<SocketAddr>,
    command_line: String,
    network_timeout: Duration,
) {
    let (mut sink, backup_path) =
        sink::create(progress_endpoint, inner.id, &command_line, network_timeout).await;
    *inner.sink_tag.lock().unwrap() = sink.tag();
    *inner.backup_path.lock().unwrap() = backup_path;

    loop {
        match pump.recv().await {
            Some(PumpEvent::Line(_source, line)) => match sink.write_line(&line).await {
                Ok(WriteOutcome::Ok) => {}
                Ok(WriteOutcome::Degraded) => {
                    *inner.sink_tag.lock().unwrap() = sink.tag();
                }
                Err(err) => {
                    error!(job_id = %inner.id, error = %err, "output sink failed, stopping line delivery");
                    break;
                }
            },
            Some(PumpEvent::Eof) | None => break,
        }
    }

    let result = sink.close().await;
    *inner.result_buffer.lock().unwrap() = result;
    let _ = inner.drained_tx.send(true);
}

async fn send_completion_callback(addr: SocketAddr, job_id: JobId, network_timeout: Duration) {
    let message = wire::format_callback_message(job_id);
    let mut delay = Duration::from_secs(1);
    for attempt in 1..=5 {
        match tokio::time::timeout(network_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                if stream.write_all(message.as_bytes()).await.is_ok() {
                    let _ = stream.shutdown().await;
                    debug!(job_id = %job_id, %addr, "completion callback delivered");
                    return;
                }
            }
            Ok(Err(err)) => {
                warn!(job_id = %job_id, %addr, attempt, error = %err, "completion callback connect failed");
            }
            Err(_) => {
                warn!(job_id = %job_id, %addr, attempt, "completion callback connect timed out");
            }
        }
        if attempt < 5 {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    error!(job_id = %job_id, %addr, "completion callback endpoint unreachable after retries");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> JobSpec {
        JobSpec {
            program_name: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            completion_callback: None,
            progress_endpoint: None,
            network_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn natural_exit_reports_exit_code_and_result() {
        let job = Job::create(JobId(1), spec("sh", &["-c", "echo hi; exit 3"])).unwrap();
        job.wait_until_finished().await;
        assert!(job.is_done());
        assert_eq!(job.state(), JobState::Exited);
        assert_eq!(job.get_exit_code().unwrap(), 3);
        assert_eq!(job.get_result().await.unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn get_result_before_done_is_an_error() {
        let job = Job::create(JobId(2), spec("sh", &["-c", "sleep 5"])).unwrap();
        assert!(matches!(
            job.get_result().await.unwrap_err(),
            AgentError::JobNotFinished(2)
        ));
        job.kill();
        job.wait_until_finished().await;
        assert_eq!(job.state(), JobState::Killed);
    }

    #[tokio::test]
    async fn kill_marks_job_killed() {
        let job = Job::create(JobId(3), spec("sh", &["-c", "sleep 30"])).unwrap();
        job.kill();
        job.wait_until_finished().await;
        assert_eq!(job.state(), JobState::Killed);
    }

    #[tokio::test]
    async fn completion_callback_payload_has_no_trailing_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut payload = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut payload)
                .await
                .unwrap();
            payload
        });

        let mut s = spec("sh", &["-c", "exit 0"]);
        s.completion_callback = Some(addr);
        let job = Job::create(JobId(4), s).unwrap();
        job.wait_until_finished().await;

        let payload = accepted.await.unwrap();
        assert_eq!(payload, b"JOB 4 COMPLETED");
    }
}
