use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::error::DhtError;
use crate::constants::MAX_DATAGRAM_SIZE;

/// A datagram read from the DHT socket.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub payload: Bytes,
    pub from: SocketAddr,
}

pub async fn listen(port: u16) -> Result<Arc<UdpSocket>, DhtError> {
    let socket = UdpSocket::bind(format!("0.0.0.0:{}", port)).await?;
    Ok(Arc::new(socket))
}

/// Forwards every datagram to `tx` until the socket fails or the receiver is
/// dropped. ICMP errors reported for earlier sends do not stop the loop.
pub fn spawn_receive_loop(
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<InboundPacket>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (n, from) = match socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) if is_transient(&e) => {
                    // ICMP port unreachable surfaces here on some platforms.
                    debug!("DHT socket receive error: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("DHT socket failed, stopping reader: {}", e);
                    return;
                }
            };
            trace!("Received {} bytes from {}", n, from);
            let packet = InboundPacket {
                payload: Bytes::copy_from_slice(&buf[..n]),
                from,
            };
            if tx.send(packet).await.is_err() {
                debug!("DHT engine gone, stopping socket reader");
                return;
            }
        }
    })
}

pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

pub async fn send(socket: &UdpSocket, addr: SocketAddr, payload: &[u8]) -> Result<usize, DhtError> {
    Ok(socket.send_to(payload, addr).await?)
}

/// Sends `payload` from a detached task. Failures are only logged.
pub fn send_detached(socket: Arc<UdpSocket>, addr: SocketAddr, payload: Vec<u8>) {
    tokio::spawn(async move {
        if let Err(e) = send(&socket, addr, &payload).await {
            warn!("DHT send to {} failed: {}", addr, e);
        }
    });
}
