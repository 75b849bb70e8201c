//! Authoritative world-replication core for chunked 2D sandbox servers.
//!
//! This crate is a thin facade over the workspace's subcrates: the real implementation lives
//! in `chunkwire_server` (chunk grid, entity registry, interest tracker, peer sessions, tick
//! loop), `chunkwire_protocol` (wire frame and packet definitions), `chunkwire_net` (transport
//! trait and the renet-backed implementation), and `chunkwire_client` (the client-side world
//! mirror). Depend on this crate to pull in the whole stack at once; depend on a subcrate
//! directly if you only need one piece of it (e.g. a client that never runs the server side).

pub use chunkwire_binary as binary;
pub use chunkwire_client as client;
pub use chunkwire_net as net;
pub use chunkwire_protocol as protocol;
pub use chunkwire_server as server;
pub use chunkwire_sticky as sticky;

pub use chunkwire_client::{ClientMirror, ViewRecord};
pub use chunkwire_net::{PeerHandle, Transport, TransportEvent};
pub use chunkwire_server::config::WorldConfig;
pub use chunkwire_server::tick::{Simulation, TickLoop};
