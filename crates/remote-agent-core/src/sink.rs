//! Output Router (C3): picks and drives one of the three sinks a Job can
//! write captured lines into.
//!
//! Per §9's design note, sink-failure handling is data-driven rather than
//! exception-driven: a single `write_line` call reports whether it caused
//! a degrade, instead of the caller catching an IO error mid-loop and
//! deciding what to do about it.

use crate::error::{AgentError, Result};
use chrono::Utc;
use remote_agent_proto::{wire, JobId};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::warn;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SinkTag {
    InMemory,
    StreamingWithBackup,
    FileOnly,
}

/// Whether a `write_line` call caused a StreamingWithBackup -> FileOnly
/// degrade, so the caller can update the Job's externally-visible sink tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Ok,
    Degraded,
}

pub enum Sink {
    InMemory {
        buffer: String,
    },
    StreamingWithBackup {
        stream: TcpStream,
        backup: BufWriter<File>,
    },
    FileOnly {
        backup: BufWriter<File>,
    },
}

impl Sink {
    pub fn tag(&self) -> SinkTag {
        match self {
            Sink::InMemory { .. } => SinkTag::InMemory,
            Sink::StreamingWithBackup { .. } => SinkTag::StreamingWithBackup,
            Sink::FileOnly { .. } => SinkTag::FileOnly,
        }
    }

    /// Append one line (without its trailing newline) to the sink.
    ///
    /// A TCP write failure degrades `StreamingWithBackup` to `FileOnly` in
    /// place and keeps going. A backup-file write failure is fatal: it is
    /// returned to the caller, who stops delivering further lines (the
    /// child process itself is unaffected).
    pub async fn write_line(&mut self, line: &str) -> Result<WriteOutcome> {
        match self {
            Sink::InMemory { buffer } => {
                buffer.push_str(line);
                buffer.push('\n');
                Ok(WriteOutcome::Ok)
            }
            Sink::StreamingWithBackup { stream, backup } => {
                let payload = format!("{line}\n");
                let mut outcome = WriteOutcome::Ok;
                if let Err(err) = stream.write_all(payload.as_bytes()).await {
                    warn!(error = %err, "progress stream write failed, degrading to file-only");
                    outcome = WriteOutcome::Degraded;
                }
                backup
                    .write_all(payload.as_bytes())
                    .await
                    .map_err(AgentError::SinkFailure)?;
                if outcome == WriteOutcome::Degraded {
                    self.degrade_to_file_only();
                }
                Ok(outcome)
            }
            Sink::FileOnly { backup } => {
                let payload = format!("{line}\n");
                backup
                    .write_all(payload.as_bytes())
                    .await
                    .map_err(AgentError::SinkFailure)?;
                Ok(WriteOutcome::Ok)
            }
        }
    }

    fn degrade_to_file_only(&mut self) {
        let owned = std::mem::replace(self, Sink::InMemory { buffer: String::new() });
        *self = match owned {
            Sink::StreamingWithBackup { stream, backup } => {
                // Best-effort: let the TCP half go away quietly.
                drop(stream);
                Sink::FileOnly { backup }
            }
            other => other,
        };
    }

    /// Flush and close the sink, returning the buffered text for
    /// `GetResult` (empty for the file/streaming variants, whose caller
    /// already received the output out of band).
    pub async fn close(mut self) -> String {
        match &mut self {
            Sink::InMemory { buffer } => std::mem::take(buffer),
            Sink::StreamingWithBackup { stream, backup } => {
                let _ = backup.flush().await;
                let _ = stream.shutdown().await;
                String::new()
            }
            Sink::FileOnly { backup } => {
                let _ = backup.flush().await;
                String::new()
            }
        }
    }
}

/// Pick and construct the sink for a newly created Job, per spec §4.3.
///
/// Returns the sink plus the backup file path, if one was created
/// (present iff the sink started as `StreamingWithBackup` or `FileOnly`).
pub async fn create(
    progress_endpoint: Option<SocketAddr>,
    job_id: JobId,
    command_line: &str,
    network_timeout: Duration,
) -> (Sink, Option<PathBuf>) {
    let Some(addr) = progress_endpoint else {
        return (Sink::InMemory { buffer: String::new() }, None);
    };

    let backup_path = backup_file_path(job_id);
    let backup = match create_backup_file(&backup_path, job_id, command_line).await {
        Ok(f) => f,
        Err(err) => {
            // Creating the backup log itself failed; there's nowhere safe
            // to degrade to, so fall back to memory rather than silently
            // dropping output.
            warn!(error = %err, "failed to create backup log, falling back to in-memory sink");
            return (Sink::InMemory { buffer: String::new() }, None);
        }
    };

    match tokio::time::timeout(network_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => (
            Sink::StreamingWithBackup { stream, backup },
            Some(backup_path),
        ),
        Ok(Err(err)) => {
            warn!(error = %err, %addr, "progress endpoint connect failed, using file-only sink");
            (Sink::FileOnly { backup }, Some(backup_path))
        }
        Err(_) => {
            warn!(%addr, timeout_ms = %network_timeout.as_millis(), "progress endpoint connect timed out, using file-only sink");
            (Sink::FileOnly { backup }, Some(backup_path))
        }
    }
}

fn backup_file_path(job_id: JobId) -> PathBuf {
    let _ = job_id;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
    std::env::temp_dir().join(wire::backup_file_name(&stamp))
}

async fn create_backup_file(
    path: &PathBuf,
    job_id: JobId,
    command_line: &str,
) -> std::io::Result<BufWriter<File>> {
    let mut file = File::create(path).await?;
    let header = wire::format_backup_header(
        job_id,
        &Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        command_line,
    );
    file.write_all(header.as_bytes()).await?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_accumulates_lines() {
        let (mut sink, backup_path) = create(None, JobId(1), "echo hi", Duration::from_secs(1)).await;
        assert!(backup_path.is_none());
        assert_eq!(sink.tag(), SinkTag::InMemory);
        sink.write_line("hello").await.unwrap();
        sink.write_line("world").await.unwrap();
        let result = sink.close().await;
        assert_eq!(result, "hello\nworld\n");
    }

    #[tokio::test]
    async fn file_only_sink_created_when_no_peer_listening() {
        // Port 1 is privileged/unassigned on loopback in the test sandbox;
        // using an address with nothing listening reliably fails to connect.
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (sink, backup_path) = create(Some(addr), JobId(7), "true", Duration::from_millis(200)).await;
        assert_eq!(sink.tag(), SinkTag::FileOnly);
        let path = backup_path.unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
