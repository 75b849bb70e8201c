use std::{
    net::{SocketAddr, UdpSocket},
    time::{Duration, SystemTime},
};

use chunkwire_protocol::channel::Channel;
use renet::{
    transport::{NetcodeServerTransport, ServerAuthentication, ServerConfig},
    ConnectionConfig, DefaultChannel, RenetServer, ServerEvent,
};

use crate::transport::{PeerHandle, Transport, TransportEvent};

const PROTOCOL_ID: u64 = 0x6368756e6b776972; // "chunkwir" in ascii, used as the netcode handshake tag

fn to_default_channel(channel: Channel) -> DefaultChannel {
    match channel {
        Channel::ReliableOrdered => DefaultChannel::ReliableOrdered,
        Channel::UnreliableUnordered => DefaultChannel::Unreliable,
    }
}

/// A [`Transport`] backed by `renet`'s reliable-UDP channel layer and netcode socket
/// transport. Peer handles are renet client ids reinterpreted as [`PeerHandle`].
pub struct RenetTransport {
    server: RenetServer,
    netcode: NetcodeServerTransport,
    start: SystemTime,
}

impl RenetTransport {
    pub fn bind(bind_addr: SocketAddr, max_clients: usize) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        let start = SystemTime::now();
        let current_time = start.duration_since(SystemTime::UNIX_EPOCH)?;

        let server_config = ServerConfig {
            current_time,
            max_clients,
            protocol_id: PROTOCOL_ID,
            public_addresses: vec![bind_addr],
            authentication: ServerAuthentication::Unsecure,
        };

        let netcode = NetcodeServerTransport::new(server_config, socket)?;
        let server = RenetServer::new(ConnectionConfig::default());

        Ok(Self {
            server,
            netcode,
            start,
        })
    }
}

impl Transport for RenetTransport {
    fn service(&mut self, timeout_ms: u64) -> Vec<TransportEvent> {
        let duration = Duration::from_millis(timeout_ms);
        self.server.update(duration);
        if let Err(error) = self.netcode.update(duration, &mut self.server) {
            tracing::warn!(%error, "netcode transport update failed");
        }

        let mut events = Vec::new();

        while let Some(event) = self.server.get_event() {
            match event {
                ServerEvent::ClientConnected { client_id } => {
                    let address = self
                        .netcode
                        .client_addr(client_id)
                        .unwrap_or_else(|| "0.0.0.0:0".parse().unwrap());
                    events.push(TransportEvent::Connected {
                        peer: PeerHandle(client_id.raw()),
                        address,
                    });
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    events.push(TransportEvent::Disconnected {
                        peer: PeerHandle(client_id.raw()),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let client_ids: Vec<_> = self.server.clients_id();
        for client_id in client_ids {
            for channel in [Channel::ReliableOrdered, Channel::UnreliableUnordered] {
                while let Some(bytes) = self
                    .server
                    .receive_message(client_id, to_default_channel(channel))
                {
                    events.push(TransportEvent::Message {
                        peer: PeerHandle(client_id.raw()),
                        channel,
                        bytes: bytes.to_vec(),
                    });
                }
            }
        }

        if let Err(error) = self.netcode.send_packets(&mut self.server) {
            tracing::warn!(%error, "netcode transport send failed");
        }

        events
    }

    fn send(&mut self, peer: PeerHandle, channel: Channel, bytes: &[u8]) -> anyhow::Result<()> {
        self.server.send_message(
            renet::ClientId::from_raw(peer.0),
            to_default_channel(channel),
            bytes.to_vec(),
        );
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerHandle, reason: &str) {
        tracing::info!(peer = peer.0, reason, "disconnecting peer");
        self.server
            .disconnect(renet::ClientId::from_raw(peer.0));
    }
}
