//! The raw "send" / "received" primitives a transport-backed channel sits on.

use crate::event::Topic;
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

pub type Inbound = Receiver<Vec<u8>>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport not configured: {0}")]
    NotConfigured(String),
    #[error("Transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Best-effort delivery to every other participant on `topic`.
    async fn send(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Dropping the returned receiver releases the subscription.
    fn subscribe(&self, topic: &Topic) -> Result<Inbound, TransportError>;
}

/// Stands in when transport settings are missing or unusable.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transport for Unconfigured {
    async fn send(&self, _topic: &Topic, _payload: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::NotConfigured(self.reason.clone()))
    }

    fn subscribe(&self, _topic: &Topic) -> Result<Inbound, TransportError> {
        Err(TransportError::NotConfigured(self.reason.clone()))
    }
}

struct HubSubscriber {
    endpoint: u64,
    topic: Topic,
    tx: Sender<Vec<u8>>,
}

/// In-process broadcast hub. Every endpoint hears every other endpoint.
#[derive(Clone, Default)]
pub struct LocalHub {
    subscribers: Arc<Mutex<Vec<HubSubscriber>>>,
    next_endpoint: Arc<AtomicU64>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> HubEndpoint {
        HubEndpoint {
            hub: self.clone(),
            id: self.next_endpoint.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        subs.len()
    }
}

#[derive(Clone)]
pub struct HubEndpoint {
    hub: LocalHub,
    id: u64,
}

#[async_trait]
impl Transport for HubEndpoint {
    async fn send(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut subs = self.hub.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        subs.iter()
            .filter(|s| s.endpoint != self.id && &s.topic == topic)
            .for_each(|s| {
                let _ = s.tx.try_send(payload.clone());
            });
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<Inbound, TransportError> {
        let (tx, rx) = async_channel::unbounded();
        self.hub.subscribers.lock().push(HubSubscriber {
            endpoint: self.id,
            topic: topic.clone(),
            tx,
        });
        Ok(rx)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfig {
    pub bind: Option<SocketAddr>,
    pub peers: Vec<SocketAddr>,
}

const MAX_DATAGRAM: usize = 64 * 1024;
/// Pause after a failed receive so a persistent socket error can't spin.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

#[async_trait]
trait DatagramSource: Send + Sync + 'static {
    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

/// Datagram transport. Each datagram is `<topic>\n<payload>`, sent to every
/// configured peer.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: Vec<SocketAddr>,
    subscribers: Arc<Mutex<Vec<(Topic, Sender<Vec<u8>>)>>>,
    reader: JoinHandle<()>,
}

impl UdpTransport {
    pub async fn bind(config: &UdpConfig) -> Result<Self, TransportError> {
        let addr = config
            .bind
            .ok_or_else(|| TransportError::NotConfigured("no UDP bind address".to_string()))?;
        if config.peers.is_empty() {
            log::warn!("UDP transport has no peers; pings will not leave this host");
        }

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        log::info!("UDP transport listening on {}", socket.local_addr()?);

        let subscribers: Arc<Mutex<Vec<(Topic, Sender<Vec<u8>>)>>> = Arc::default();
        let reader = tokio::spawn(read_datagrams(socket.clone(), subscribers.clone()));

        Ok(Self {
            socket,
            peers: config.peers.clone(),
            subscribers,
            reader,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_datagrams<S: DatagramSource>(
    socket: Arc<S>,
    subscribers: Arc<Mutex<Vec<(Topic, Sender<Vec<u8>>)>>>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("UDP receive error: {}", e);
                tokio::time::sleep(RECV_BACKOFF).await;
                continue;
            }
        };

        let Some((topic, payload)) = split_frame(&buf[..len]) else {
            log::warn!("Dropping unframed datagram from {}", from);
            continue;
        };

        let mut subs = subscribers.lock();
        subs.retain(|(_, tx)| !tx.is_closed());
        subs.iter()
            .filter(|(t, _)| t.as_str() == topic)
            .for_each(|(_, tx)| {
                let _ = tx.try_send(payload.to_vec());
            });
    }
}

fn frame(topic: &Topic, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(topic.len() + 1 + payload.len());
    out.extend_from_slice(topic.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(payload);
    out
}

fn split_frame(datagram: &[u8]) -> Option<(&str, &[u8])> {
    let split = datagram.iter().position(|b| *b == b'\n')?;
    let topic = std::str::from_utf8(&datagram[..split]).ok()?;
    Some((topic, &datagram[split + 1..]))
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), TransportError> {
        let datagram = frame(topic, &payload);
        for peer in &self.peers {
            if let Err(e) = self.socket.send_to(&datagram, peer).await {
                log::warn!("Failed to send ping to {}: {}", peer, e);
            }
        }
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<Inbound, TransportError> {
        if self.reader.is_finished() {
            return Err(TransportError::Closed);
        }
        let (tx, rx) = async_channel::unbounded();
        self.subscribers.lock().push((topic.clone(), tx));
        Ok(rx)
    }
}
