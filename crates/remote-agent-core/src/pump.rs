//! Line Pump (C2): merges a job's stdout and stderr pipes into a single
//! ordered stream of line events.
//!
//! Shaped after the teacher's `output_reader_task_main` (one task per
//! captured stream, forwarding into a shared channel) but reframed around
//! line boundaries instead of raw byte chunks, and with an explicit `Eof`
//! sentinel once both streams are drained instead of relying on callers to
//! notice the channel closed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Source {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub enum PumpEvent {
    Line(Source, String),
    Eof,
}

/// Reads a single captured stream into the shared channel line by line.
/// `remaining` is shared between the stdout and stderr readers; the last
/// one to finish emits the terminal `Eof`.
async fn read_lines<R: AsyncRead + Unpin>(
    stream: R,
    source: Source,
    tx: mpsc::UnboundedSender<PumpEvent>,
    remaining: Arc<AtomicUsize>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(PumpEvent::Line(source, line)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        let _ = tx.send(PumpEvent::Eof);
    }
}

pub struct LinePump {
    rx: mpsc::UnboundedReceiver<PumpEvent>,
}

impl LinePump {
    /// Spawn the two reader tasks and return a handle to receive merged
    /// events from. The returned join handles are for tests that want to
    /// assert both readers actually finish; normal callers can drop them.
    pub fn spawn<O, E>(stdout: O, stderr: E) -> (Self, JoinHandle<()>, JoinHandle<()>)
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let remaining = Arc::new(AtomicUsize::new(2));

        let tx_out = tx.clone();
        let remaining_out = remaining.clone();
        let h_out = tokio::spawn(async move {
            read_lines(stdout, Source::Stdout, tx_out, remaining_out).await;
        });

        let h_err = tokio::spawn(async move {
            read_lines(stderr, Source::Stderr, tx, remaining).await;
        });

        (LinePump { rx }, h_out, h_err)
    }

    pub async fn recv(&mut self) -> Option<PumpEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn emits_eof_once_both_streams_close() {
        let (mut out_w, out_r) = duplex(64);
        let (mut err_w, err_r) = duplex(64);
        let (mut pump, h1, h2) = LinePump::spawn(out_r, err_r);

        use tokio::io::AsyncWriteExt;
        out_w.write_all(b"hello\n").await.unwrap();
        err_w.write_all(b"oops\n").await.unwrap();
        drop(out_w);
        drop(err_w);

        let mut lines = Vec::new();
        loop {
            match pump.recv().await {
                Some(PumpEvent::Line(src, line)) => lines.push((src, line)),
                Some(PumpEvent::Eof) => break,
                None => panic!("channel closed before Eof sentinel"),
            }
        }

        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&(Source::Stdout, "hello".to_string())));
        assert!(lines.contains(&(Source::Stderr, "oops".to_string())));

        h1.await.unwrap();
        h2.await.unwrap();
    }

    #[tokio::test]
    async fn strips_trailing_newline() {
        let (mut out_w, out_r) = duplex(64);
        let (_err_w, err_r) = duplex(64);
        let (mut pump, _h1, _h2) = LinePump::spawn(out_r, err_r);

        use tokio::io::AsyncWriteExt;
        out_w.write_all(b"line one\r\nline two\n").await.unwrap();
        drop(out_w);
        drop(_err_w);

        let mut seen = Vec::new();
        while let Some(event) = pump.recv().await {
            match event {
                PumpEvent::Line(_, l) => seen.push(l),
                PumpEvent::Eof => break,
            }
        }
        assert_eq!(seen, vec!["line one".to_string(), "line two".to_string()]);
    }
}
