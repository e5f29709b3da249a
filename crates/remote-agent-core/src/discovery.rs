//! UDP broadcast discovery responder.
//!
//! Kept in scope as a small collaborator even though a full LAN-discovery
//! subsystem is out of scope (spec §1): any client that broadcasts the
//! well-known ping gets the RPC port echoed back so it can connect
//! directly. New; no teacher analogue, modeled after the fixed-format
//! request/response pairs `rpc.rs` already defines.

use remote_agent_proto::wire;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Runs forever, answering any datagram matching the discovery ping with
/// the 4-byte little-endian RPC port. Malformed or unrelated datagrams
/// are ignored, not logged as errors: broadcast sockets routinely see
/// other services' chatter.
pub async fn run_responder(socket: UdpSocket, rpc_port: u16) -> std::io::Result<()> {
    let mut buf = [0u8; 256];
    loop {
        let (len, peer): (usize, SocketAddr) = socket.recv_from(&mut buf).await?;
        if &buf[..len] != wire::DISCOVERY_PING {
            continue;
        }
        let reply = wire::encode_discovery_port(rpc_port);
        match socket.send_to(&reply, peer).await {
            Ok(_) => debug!(%peer, rpc_port, "answered discovery ping"),
            Err(err) => warn!(%peer, error = %err, "failed to answer discovery ping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_with_encoded_port_on_exact_match() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = tokio::spawn(run_responder(server, 4321));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(wire::DISCOVERY_PING, server_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], &wire::encode_discovery_port(4321));
        handle.abort();
    }

    #[tokio::test]
    async fn ignores_non_matching_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = tokio::spawn(run_responder(server, 9999));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"not a ping", server_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            client.recv_from(&mut buf),
        )
        .await;
        assert!(result.is_err(), "responder should not have replied");
        handle.abort();
    }
}
