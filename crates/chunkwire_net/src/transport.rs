use std::net::SocketAddr;

use chunkwire_protocol::channel::Channel;

/// Opaque identifier for a connected peer. Stable for the lifetime of the connection;
/// never reused while the peer session it names is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u64);

#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        peer: PeerHandle,
        address: SocketAddr,
    },
    Disconnected {
        peer: PeerHandle,
        reason: String,
    },
    Message {
        peer: PeerHandle,
        channel: Channel,
        bytes: Vec<u8>,
    },
}

/// The transport contract the tick loop and peer session table depend on. Concrete
/// networking (see [`crate::renet_transport::RenetTransport`]) lives behind this trait so the
/// replication core never references a specific wire library directly.
pub trait Transport {
    /// Pumps the underlying socket for up to `timeout_ms` and drains every event that
    /// occurred since the last call. Never blocks past `timeout_ms`.
    fn service(&mut self, timeout_ms: u64) -> Vec<TransportEvent>;

    fn send(&mut self, peer: PeerHandle, channel: Channel, bytes: &[u8]) -> anyhow::Result<()>;

    fn disconnect(&mut self, peer: PeerHandle, reason: &str);
}
