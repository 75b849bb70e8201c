//! Drives the simulation step and periodic replication writes.
//!
//! The tick loop is single-threaded and cooperative: input drain, simulation step, and the
//! replication window never run concurrently within one iteration, and no step here ever
//! blocks past the transport's own `service` timeout.

use std::time::{Duration, Instant};

use chunkwire_net::{PeerHandle, Transport, TransportEvent};
use chunkwire_protocol::packets::{KeyState, SpawnCar, TrackerUpdate, Welcome};
use chunkwire_protocol::snapshot::EntitySnapshot;
use chunkwire_protocol::{IdentifiedPacket, PacketHandler};

use crate::chunk_grid::ChunkGrid;
use crate::config::WorldConfig;
use crate::entity::{resolve_chunk_id, ClientInfo, EntityRegistry, Input, Kind, Position};
use crate::error::TickError;
use crate::peer::{ConnectionState, ObserverId, PeerTable};
use crate::tracker::InterestTracker;

/// Per-peer replication write buffer size: 8 KiB, caller-allocated and reused across ticks
/// rather than freed and reallocated every replication window.
pub const REPLICATION_BUFFER_BYTES: usize = 8 * 1024;

/// Advances the ECS world by one simulation step. Deliberately a trait rather than a
/// concrete type: the tick loop never bakes in gameplay logic (terrain, physics, AI), all of
/// which are left to the embedding application.
pub trait Simulation {
    fn step(&mut self, registry: &mut EntityRegistry);
}

/// A [`Simulation`] that does nothing, for tests and tools that only exercise replication.
impl Simulation for () {
    fn step(&mut self, _registry: &mut EntityRegistry) {}
}

/// Single-threaded server loop: drains inbound datagrams, advances the simulation, and
/// issues a replication write to every READY peer once per `replication_period_ms`.
pub struct TickLoop<T: Transport, S: Simulation> {
    transport: T,
    simulation: S,
    grid: ChunkGrid,
    registry: EntityRegistry,
    tracker: InterestTracker,
    peers: PeerTable,
    replication_period: Duration,
    last_replication: Instant,
    write_buffer: Vec<u8>,
    running: bool,
    /// Set by `drain_input` immediately before dispatching a decoded packet to
    /// [`PacketHandler::parse_and_handle`], so the `handle_*` callbacks below know which
    /// peer sent the packet without threading it through the macro-generated trait.
    current_peer: Option<PeerHandle>,
}

impl<T: Transport, S: Simulation> TickLoop<T, S> {
    pub fn new(transport: T, simulation: S, config: &WorldConfig) -> Self {
        let grid = config.chunk_grid();
        Self {
            transport,
            simulation,
            grid,
            registry: EntityRegistry::new(),
            tracker: InterestTracker::new(grid, config.chunk_view_radius),
            peers: PeerTable::new(),
            replication_period: Duration::from_millis(config.replication_period_ms),
            last_replication: Instant::now(),
            write_buffer: vec![0u8; REPLICATION_BUFFER_BYTES],
            running: true,
            current_peer: None,
        }
    }

    pub fn request_shutdown(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Runs one full tick: input drain, simulation step, chunk reconciliation, replication
    /// window, all gated behind `self.running` so a shutdown signal takes effect at the top
    /// of the next iteration rather than mid-tick.
    pub fn tick(&mut self, service_timeout_ms: u64) {
        if !self.running {
            return;
        }

        self.drain_input(service_timeout_ms);
        self.simulation.step(&mut self.registry);
        self.reconcile_chunks();
        if self.replicate_if_due() {
            self.reap_leaving_peers();
        }
    }

    fn drain_input(&mut self, service_timeout_ms: u64) {
        let events = self.transport.service(service_timeout_ms);
        for event in events {
            match event {
                TransportEvent::Connected { peer, .. } => self.on_connect(peer),
                TransportEvent::Disconnected { peer, reason } => self.on_disconnect(peer, &reason),
                TransportEvent::Message { peer, bytes, .. } => self.on_message(peer, &bytes),
            }
        }
    }

    fn on_connect(&mut self, peer: PeerHandle) {
        let owned_entity_id = self.registry.create();
        self.registry.set(owned_entity_id, Position { x: 0, y: 0 });
        self.registry.set(owned_entity_id, Kind::PLAYER);

        let observer_id = self.peers.connect(peer, owned_entity_id);
        self.registry.set(
            owned_entity_id,
            ClientInfo {
                peer_handle: peer.0,
                view_id: observer_id.as_u16(),
            },
        );

        self.tracker.track(owned_entity_id);
        self.tracker.set_owner(owned_entity_id, observer_id);
        let chunk_id = resolve_chunk_id(&self.registry, owned_entity_id, &self.grid);
        self.tracker.set_chunk(owned_entity_id, chunk_id);

        self.peers.mark_ready(peer);

        let welcome = Welcome {
            block_size: self.grid.block_size(),
            chunk_size: self.grid.chunk_size(),
            world_size: self.grid.world_size(),
            view_id: observer_id.as_u16(),
        };
        self.send_packet(peer, &welcome);

        tracing::info!(peer = peer.0, observer_id = observer_id.as_u16(), "peer connected");
    }

    /// Marks the session LEAVING and tears down the owned entity immediately, so the next
    /// replication write produces a REMOVE for every other observer. The `PeerTable` entry
    /// and the session's own `observer_id` are kept alive until [`Self::reap_leaving_peers`]
    /// runs after that write actually goes out, so a stray message arriving for this peer in
    /// the meantime still resolves to a (leaving) session instead of nothing.
    fn on_disconnect(&mut self, peer: PeerHandle, reason: &str) {
        tracing::info!(peer = peer.0, reason, "peer disconnected");

        self.peers.mark_leaving(peer);
        let Some(session) = self.peers.get(peer) else {
            return;
        };

        self.tracker.untrack(session.owned_entity_id);
        self.registry.delete(session.owned_entity_id);
    }

    /// Finishes tearing down every LEAVING session once a replication write has gone out,
    /// recycling its `observer_id` only now that other observers have had a chance to see
    /// the REMOVE their diff produced for its owned entity.
    fn reap_leaving_peers(&mut self) {
        let leaving: Vec<(PeerHandle, ObserverId)> = self
            .peers
            .iter_leaving()
            .map(|session| (session.peer_handle, session.observer_id))
            .collect();

        for (peer, observer_id) in leaving {
            self.peers.disconnect(peer);
            self.tracker.forget_observer(observer_id);
        }
    }

    fn on_message(&mut self, peer: PeerHandle, bytes: &[u8]) {
        self.current_peer = Some(peer);
        if let Err(source) = self.parse_and_handle(bytes) {
            let error = TickError::MalformedFrame { peer: peer.0, source };
            tracing::warn!(peer = peer.0, %error, "malformed packet");
            if self.peers.record_malformed(peer) {
                tracing::warn!(peer = peer.0, "three consecutive malformed frames, disconnecting");
                self.transport.disconnect(peer, "malformed frame limit exceeded");
                self.on_disconnect(peer, "malformed frame limit exceeded");
            }
        } else {
            self.peers.record_well_formed(peer);
        }
        self.current_peer = None;
    }

    fn send_packet<P>(&mut self, peer: PeerHandle, packet: &P)
    where
        P: IdentifiedPacket<chunkwire_protocol::packets::PacketId> + serde::Serialize,
    {
        let packet_id = packet.get_packet_id();
        match chunkwire_protocol::frame::encode_frame(packet_id as u16, packet) {
            Ok(bytes) => {
                if let Err(error) = self.transport.send(peer, packet_id.channel(), &bytes) {
                    tracing::warn!(peer = peer.0, %error, "failed to send packet");
                }
            }
            Err(error) => tracing::warn!(peer = peer.0, %error, "failed to encode packet"),
        }
    }

    /// Recomputes every positioned entity's chunk id and feeds it to the tracker, so position
    /// changes made by this tick's simulation step are visible to the next replication write.
    fn reconcile_chunks(&mut self) {
        for (entity_id, _) in self.registry.query_positioned() {
            let chunk_id = resolve_chunk_id(&self.registry, entity_id, &self.grid);
            if self.tracker.chunk_of(entity_id) != Some(chunk_id) {
                self.tracker.set_chunk(entity_id, chunk_id);
            }
        }
    }

    /// Returns `true` if the replication window actually ran this tick (i.e. the period has
    /// elapsed), regardless of whether any READY peer needed a write.
    fn replicate_if_due(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_replication) < self.replication_period {
            return false;
        }
        self.last_replication = now;

        let ready_peers: Vec<(PeerHandle, ObserverId)> = self
            .peers
            .iter_ready()
            .map(|session| (session.peer_handle, session.observer_id))
            .collect();

        for (peer, observer_id) in ready_peers {
            let registry = &self.registry;
            let mut buffer = std::mem::take(&mut self.write_buffer);
            let outcome = self.tracker.write(observer_id, &mut buffer, false, |entity_id| {
                let position = registry.get::<Position>(entity_id)?;
                let kind = registry.get::<Kind>(entity_id).unwrap_or(Kind::GENERIC);
                Some(EntitySnapshot::new(position.x, position.y, kind.0, &[]))
            });

            let packet = TrackerUpdate {
                overflow: outcome.overflow_hint > 0,
                records: buffer[..outcome.bytes_written].to_vec(),
            };
            self.write_buffer = buffer;

            if outcome.overflow_hint > 0 {
                tracing::warn!(
                    peer = peer.0,
                    overflow_hint = outcome.overflow_hint,
                    "replication buffer overflow, stream truncated to a valid prefix"
                );
            }

            self.send_packet(peer, &packet);
        }

        true
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    pub fn tracker_mut(&mut self) -> &mut InterestTracker {
        &mut self.tracker
    }
}

impl<T: Transport, S: Simulation> PacketHandler for TickLoop<T, S> {
    fn handle_key_state(&mut self, packet: KeyState) -> anyhow::Result<()> {
        let Some(peer) = self.current_peer else {
            return Ok(());
        };
        let Some(session) = self.peers.get(peer) else {
            return Ok(());
        };
        if session.connection_state == ConnectionState::Leaving {
            return Ok(());
        }

        self.registry.set(
            session.owned_entity_id,
            Input {
                x: packet.x,
                y: packet.y,
                use_item: packet.use_item,
                sprint: packet.sprint,
            },
        );
        Ok(())
    }

    fn handle_spawn_car(&mut self, _packet: SpawnCar) -> anyhow::Result<()> {
        let Some(peer) = self.current_peer else {
            return Ok(());
        };
        let Some(session) = self.peers.get(peer) else {
            return Ok(());
        };
        let Some(position) = self.registry.get::<Position>(session.owned_entity_id) else {
            return Ok(());
        };

        let car = self.registry.create();
        self.registry.set(car, position);
        self.registry.set(car, Kind::CAR);

        self.tracker.track(car);
        self.tracker.set_radius(car, 2);
        let chunk_id = resolve_chunk_id(&self.registry, car, &self.grid);
        self.tracker.set_chunk(car, chunk_id);

        tracing::info!(peer = peer.0, "spawned car");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkwire_protocol::channel::Channel;
    use std::net::SocketAddr;

    /// An in-memory [`Transport`] double driven by a scripted event queue, used so the tick
    /// loop's orchestration can be exercised without a real socket.
    #[derive(Default)]
    struct FakeTransport {
        pending_events: Vec<TransportEvent>,
        sent: Vec<(PeerHandle, Channel, Vec<u8>)>,
    }

    impl Transport for FakeTransport {
        fn service(&mut self, _timeout_ms: u64) -> Vec<TransportEvent> {
            std::mem::take(&mut self.pending_events)
        }

        fn send(&mut self, peer: PeerHandle, channel: Channel, bytes: &[u8]) -> anyhow::Result<()> {
            self.sent.push((peer, channel, bytes.to_vec()));
            Ok(())
        }

        fn disconnect(&mut self, _peer: PeerHandle, _reason: &str) {}
    }

    fn test_config() -> WorldConfig {
        use clap::Parser;
        WorldConfig::parse_from(["chunkwire-server"])
    }

    /// Same defaults, but with the replication window due on every tick, for tests that need
    /// to observe the reap that follows a replication write within a single `tick()` call.
    fn zero_period_config() -> WorldConfig {
        use clap::Parser;
        WorldConfig::parse_from(["chunkwire-server", "--replication-period-ms", "0"])
    }

    #[test]
    fn connect_sends_welcome_with_grid_parameters() {
        let mut transport = FakeTransport::default();
        transport.pending_events.push(TransportEvent::Connected {
            peer: PeerHandle(1),
            address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        });

        let config = test_config();
        let mut tick_loop = TickLoop::new(transport, (), &config);
        tick_loop.tick(0);

        assert_eq!(tick_loop.peer_count(), 1);
        let sent = &tick_loop.transport.sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, Channel::ReliableOrdered);

        let frame = chunkwire_protocol::frame::decode_frame(&sent[0].2).unwrap();
        let welcome: Welcome = chunkwire_protocol::frame::decode_body(&frame.body).unwrap();
        assert_eq!(welcome.block_size, config.block_size);
        assert_eq!(welcome.chunk_size, config.chunk_size);
        assert_eq!(welcome.world_size, config.world_size);
        assert_eq!(welcome.view_id, 1);
    }

    #[test]
    fn disconnect_untracks_owned_entity() {
        let mut transport = FakeTransport::default();
        transport.pending_events.push(TransportEvent::Connected {
            peer: PeerHandle(1),
            address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        });

        let config = zero_period_config();
        let mut tick_loop = TickLoop::new(transport, (), &config);
        tick_loop.tick(0);
        assert_eq!(tick_loop.peer_count(), 1);

        let owned = tick_loop.peers.get(PeerHandle(1)).unwrap().owned_entity_id;

        tick_loop.transport.pending_events.push(TransportEvent::Disconnected {
            peer: PeerHandle(1),
            reason: "client left".into(),
        });
        tick_loop.tick(0);

        assert_eq!(tick_loop.peer_count(), 0);
        assert!(!tick_loop.registry().exists(owned));
    }

    #[test]
    fn disconnect_marks_leaving_until_reaped_by_the_next_due_replication() {
        let mut transport = FakeTransport::default();
        transport.pending_events.push(TransportEvent::Connected {
            peer: PeerHandle(1),
            address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        });

        // Default (non-zero) replication period: the replication window isn't due on the
        // very next tick, so the disconnected session should still be present but LEAVING.
        let config = test_config();
        let mut tick_loop = TickLoop::new(transport, (), &config);
        tick_loop.tick(0);

        let owned = tick_loop.peers.get(PeerHandle(1)).unwrap().owned_entity_id;

        tick_loop.transport.pending_events.push(TransportEvent::Disconnected {
            peer: PeerHandle(1),
            reason: "client left".into(),
        });
        tick_loop.tick(0);

        assert_eq!(tick_loop.peer_count(), 1, "session stays until reaped");
        assert_eq!(
            tick_loop.peers.get(PeerHandle(1)).unwrap().connection_state,
            ConnectionState::Leaving
        );
        assert!(!tick_loop.registry().exists(owned), "owned entity is deleted immediately");
    }

    #[test]
    fn three_unknown_packet_ids_in_a_row_disconnect_the_peer() {
        let mut transport = FakeTransport::default();
        transport.pending_events.push(TransportEvent::Connected {
            peer: PeerHandle(1),
            address: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        });

        let config = zero_period_config();
        let mut tick_loop = TickLoop::new(transport, (), &config);
        tick_loop.tick(0);
        assert_eq!(tick_loop.peer_count(), 1);

        // A frame whose outer packet id doesn't correspond to any known packet type.
        let bad_frame = chunkwire_protocol::frame::encode_frame(0xFFFFu16, &SpawnCar).unwrap();

        for _ in 0..2 {
            tick_loop.transport.pending_events.push(TransportEvent::Message {
                peer: PeerHandle(1),
                channel: Channel::ReliableOrdered,
                bytes: bad_frame.clone(),
            });
            tick_loop.tick(0);
            assert_eq!(tick_loop.peer_count(), 1, "should not disconnect before the third strike");
        }

        tick_loop.transport.pending_events.push(TransportEvent::Message {
            peer: PeerHandle(1),
            channel: Channel::ReliableOrdered,
            bytes: bad_frame,
        });
        tick_loop.tick(0);

        assert_eq!(
            tick_loop.peer_count(),
            0,
            "three consecutive unknown packet ids disconnect the peer"
        );
    }
}
