use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, warn};
use nfn_relay::{Pacer, PeerAddr};
use tokio::net::{UdpSocket, UnixDatagram};
use tokio::sync::mpsc;

use crate::config::InterfaceConfig;

/// Largest datagram the relay accepts
pub const MAX_DATAGRAM: usize = 8 * 1024;

/// A datagram received on one of the interfaces
#[derive(Debug)]
pub struct Inbound {
    pub ifindex: usize,
    pub peer: PeerAddr,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
enum Socket {
    Udp(UdpSocket),
    Unix { socket: UnixDatagram, path: PathBuf },
}

/// A bound local socket with its own outbound pacing
#[derive(Debug)]
pub struct Interface {
    pub ifindex: usize,
    socket: Arc<Socket>,
    pacer: Pacer,
    backlog: VecDeque<(PeerAddr, Vec<u8>)>,
}

impl Interface {
    /// Bind the socket described by `config`. Failing to bind is fatal for
    /// the daemon.
    pub async fn bind(ifindex: usize, config: &InterfaceConfig, interval: Duration) -> anyhow::Result<Self> {
        let socket = match config {
            InterfaceConfig::Udp { bind } => {
                let socket = UdpSocket::bind(bind)
                    .await
                    .with_context(|| format!("binding UDP socket {}", bind))?;
                Socket::Udp(socket)
            }
            InterfaceConfig::Unix { path } => {
                if path.exists() {
                    std::fs::remove_file(path)
                        .with_context(|| format!("removing stale socket {}", path.display()))?;
                }
                let socket = UnixDatagram::bind(path)
                    .with_context(|| format!("binding Unix socket {}", path.display()))?;
                Socket::Unix {
                    socket,
                    path: path.clone(),
                }
            }
        };
        Ok(Self {
            ifindex,
            socket: Arc::new(socket),
            pacer: Pacer::new(interval),
            backlog: VecDeque::new(),
        })
    }

    /// Local UDP address, if this is a UDP interface
    pub fn udp_addr(&self) -> Option<std::net::SocketAddr> {
        match self.socket.as_ref() {
            Socket::Udp(socket) => socket.local_addr().ok(),
            Socket::Unix { .. } => None,
        }
    }

    pub fn unix_path(&self) -> Option<&Path> {
        match self.socket.as_ref() {
            Socket::Udp(_) => None,
            Socket::Unix { path, .. } => Some(path),
        }
    }

    /// Spawn a task that forwards every received datagram to `tx`
    pub fn spawn_receiver(&self, tx: mpsc::Sender<Inbound>) -> tokio::task::JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let ifindex = self.ifindex;
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let received = match socket.as_ref() {
                    Socket::Udp(socket) => socket
                        .recv_from(&mut buf)
                        .await
                        .map(|(len, addr)| Some((len, PeerAddr::Udp(addr)))),
                    Socket::Unix { socket, .. } => socket.recv_from(&mut buf).await.map(|(len, addr)| {
                        addr.as_pathname()
                            .map(|path| (len, PeerAddr::Unix(path.to_path_buf())))
                    }),
                };
                match received {
                    Ok(Some((len, peer))) => {
                        let inbound = Inbound {
                            ifindex,
                            peer,
                            bytes: buf[..len].to_vec(),
                        };
                        if tx.send(inbound).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("Interface {}: ignoring datagram from unnamed peer", ifindex),
                    Err(e) => warn!("Interface {}: receive failed: {}", ifindex, e),
                }
            }
        })
    }

    /// Queue an encoded packet for a peer
    pub fn queue(&mut self, peer: PeerAddr, bytes: Vec<u8>) {
        self.backlog.push_back((peer, bytes));
    }

    pub fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// When the next queued datagram may leave
    pub fn next_slot(&self) -> Option<Instant> {
        if self.backlog.is_empty() {
            None
        } else {
            self.pacer.next_slot()
        }
    }

    /// Send queued datagrams while the pacer allows. A failed send drops
    /// the datagram.
    pub async fn flush(&mut self, now: Instant) -> usize {
        let mut sent = 0;
        while self.pacer.ready(now) {
            let Some((peer, bytes)) = self.backlog.pop_front() else {
                break;
            };
            match self.send_to(&peer, &bytes).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("Interface {}: send to {} failed: {}", self.ifindex, peer, e),
            }
            self.pacer.mark_sent(now);
        }
        sent
    }

    async fn send_to(&self, peer: &PeerAddr, bytes: &[u8]) -> std::io::Result<()> {
        match (self.socket.as_ref(), peer) {
            (Socket::Udp(socket), PeerAddr::Udp(addr)) => socket.send_to(bytes, addr).await.map(|_| ()),
            (Socket::Unix { socket, .. }, PeerAddr::Unix(path)) => socket.send_to(bytes, path).await.map(|_| ()),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "peer address does not match interface type",
            )),
        }
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        if let Socket::Unix { path, .. } = self.socket.as_ref() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_receive_and_send() {
        let mut iface = Interface::bind(
            3,
            &InterfaceConfig::Udp {
                bind: "127.0.0.1:0".parse().unwrap(),
            },
            Duration::ZERO,
        )
        .await
        .unwrap();
        let addr = iface.udp_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let receiver = iface.spawn_receiver(tx);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"ping", addr).await.unwrap();
        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.ifindex, 3);
        assert_eq!(inbound.bytes, b"ping");
        assert_eq!(inbound.peer, PeerAddr::Udp(client.local_addr().unwrap()));

        iface.queue(inbound.peer, b"pong".to_vec());
        assert_eq!(iface.flush(Instant::now()).await, 1);
        let mut buf = [0u8; 16];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"pong");
        receiver.abort();
    }

    #[tokio::test]
    async fn test_unix_receive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.sock");
        let iface = Interface::bind(0, &InterfaceConfig::Unix { path: path.clone() }, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(iface.unix_path(), Some(path.as_path()));
        let (tx, mut rx) = mpsc::channel(4);
        let receiver = iface.spawn_receiver(tx);

        let client_path = dir.path().join("client.sock");
        let client = UnixDatagram::bind(&client_path).unwrap();
        client.send_to(b"hello", &path).await.unwrap();
        let inbound = rx.recv().await.unwrap();
        assert_eq!(inbound.peer, PeerAddr::Unix(client_path));
        assert_eq!(inbound.bytes, b"hello");
        receiver.abort();
    }

    #[tokio::test]
    async fn test_pacing_holds_backlog() {
        let mut iface = Interface::bind(
            0,
            &InterfaceConfig::Udp {
                bind: "127.0.0.1:0".parse().unwrap(),
            },
            Duration::from_secs(60),
        )
        .await
        .unwrap();
        let target = iface.udp_addr().unwrap();
        iface.queue(PeerAddr::Udp(target), b"one".to_vec());
        iface.queue(PeerAddr::Udp(target), b"two".to_vec());

        let now = Instant::now();
        assert_eq!(iface.flush(now).await, 1);
        assert!(iface.has_backlog());
        assert_eq!(iface.next_slot(), Some(now + Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = InterfaceConfig::Udp {
            bind: taken.local_addr().unwrap(),
        };
        assert!(Interface::bind(0, &config, Duration::ZERO).await.is_err());
    }
}
