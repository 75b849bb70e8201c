use serde::{Deserialize, Serialize};

use crate::identify_packets;

/// Sent once by the server right after a peer session reaches `READY`. Carries the world's
/// chunk-grid parameters so the client can build a matching grid locally, plus the view id
/// the interest tracker will key that peer's visibility window on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Welcome {
    pub block_size: u16,
    pub chunk_size: u16,
    pub world_size: u16,
    pub view_id: u16,
}

/// Sent by the client whenever its local input state changes. Carries the full input state
/// rather than a delta, so dropping one on an unreliable channel just holds the previous
/// input one tick longer instead of desyncing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyState {
    pub x: i8,
    pub y: i8,
    pub use_item: bool,
    pub sprint: bool,
}

/// Carries one tick's worth of interest-tracker output for the receiving peer's view.
/// `records` is opaque to MessagePack: it's the fixed-schema record stream produced by
/// [`crate::snapshot`], not re-encoded as individual MessagePack fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUpdate {
    pub overflow: bool,
    #[serde(with = "serde_bytes")]
    pub records: Vec<u8>,
}

/// Requests that the server spawn a car entity at the sender's current position. Carries no
/// fields: the server already knows the sender's position from their own owned entity, so
/// there is nothing for the client to supply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpawnCar;

identify_packets! {
    PacketId,
    Welcome = 0x01,
    KeyState = 0x02,
    TrackerUpdate = 0x03,
    SpawnCar = 0x04
}
