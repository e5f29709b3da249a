//! Transfer Listener (C6): a one-shot TCP acceptor bound for exactly one
//! Upload or Download transfer.
//!
//! No direct teacher analogue (the worker's own listeners are long-lived);
//! this follows the accept-with-timeout discipline spec §5 spells out:
//! bind, hand the port back to the caller, accept exactly one connection
//! within a bounded window, then the listener goes away regardless of
//! outcome so the ephemeral port is freed.

use crate::error::{AgentError, Result};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

pub struct TransferListener {
    pub port: u16,
    listener: TcpListener,
}

impl TransferListener {
    /// Binds a listener on `requested_port`, or an OS-assigned ephemeral
    /// port if `requested_port` is 0. A nonzero `requested_port` sets
    /// `SO_REUSEADDR` first, since the caller is asking for a specific
    /// port that may still be in `TIME_WAIT` from a previous transfer.
    pub async fn bind(requested_port: u16) -> Result<Self> {
        let addr: SocketAddr = ([0, 0, 0, 0], requested_port).into();

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        if requested_port != 0 {
            socket
                .set_reuse_address(true)
                .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        }
        socket
            .bind(&addr.into())
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        socket
            .listen(1)
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;

        let listener = TcpListener::from_std(socket.into())
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| AgentError::TransferProtocol(e.to_string()))?
            .port();

        Ok(TransferListener { port, listener })
    }

    /// Accepts exactly one connection within `timeout`, then consumes the
    /// listener so the port is released whether or not a peer showed up.
    pub async fn accept_one(self, timeout: Duration) -> Result<TcpStream> {
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok((stream, _))) => Ok(stream),
            Ok(Err(err)) => Err(AgentError::TransferProtocol(err.to_string())),
            Err(_) => Err(AgentError::TransferTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn bind_with_zero_port_gets_ephemeral_port() {
        let listener = TransferListener::bind(0).await.unwrap();
        assert!(listener.port > 0);
    }

    #[tokio::test]
    #[serial]
    async fn accept_one_times_out_with_no_peer() {
        let listener = TransferListener::bind(0).await.unwrap();
        let result = listener.accept_one(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AgentError::TransferTimeout)));
    }

    #[tokio::test]
    #[serial]
    async fn accept_one_succeeds_when_peer_connects() {
        let listener = TransferListener::bind(0).await.unwrap();
        let port = listener.port;
        let connector = tokio::spawn(async move {
            TcpStream::connect(("127.0.0.1", port)).await.unwrap()
        });
        let accepted = listener.accept_one(Duration::from_secs(2)).await;
        assert!(accepted.is_ok());
        connector.await.unwrap();
    }
}
