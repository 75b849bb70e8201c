//! Maps a transport peer to an observer id and an owned entity, and drives
//! the connect/disconnect handshake.

use chunkwire_net::PeerHandle;
use chunkwire_sticky::{StickyMap, Unsticky};

use crate::entity::EntityId;

/// Per-peer visibility key the interest tracker keys observer state on.
/// `0` is reserved as "no observer", mirroring [`crate::chunk_grid::CHUNK_NONE`]'s
/// role for chunk ids — it is never handed out by [`PeerTable::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u16);

impl ObserverId {
    pub const NONE: ObserverId = ObserverId(0);

    pub fn as_u16(self) -> u16 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u16) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Ready,
    Leaving,
}

/// Per-peer session state. Owned solely by [`PeerTable`] — every other
/// subsystem refers to it only by the plain `observer_id`/`peer_handle`
/// values, never by a stored pointer (see Design Notes on cyclic references).
#[derive(Debug)]
pub struct PeerSession {
    pub peer_handle: PeerHandle,
    pub observer_id: ObserverId,
    pub owned_entity_id: EntityId,
    pub connection_state: ConnectionState,
    /// Consecutive malformed/unknown frames received from this peer since the
    /// last well-formed one. Reset on any packet that parses cleanly; three in
    /// a row triggers a disconnect.
    pub consecutive_malformed: u8,
}

impl Unsticky for PeerSession {
    type UnstuckType = PeerSession;

    // No self-referential pointers are ever taken into a `PeerSession` — the
    // stable address `StickyMap` provides is unused headroom here, not a
    // requirement. `update_pointer` is a deliberate no-op.
    fn update_pointer(&mut self) {}

    fn unstick(self) -> Self::UnstuckType {
        self
    }
}

/// Allocates observer ids monotonically and stores one [`PeerSession`] per
/// connected transport peer.
pub struct PeerTable {
    sessions: StickyMap<PeerHandle, PeerSession>,
    next_observer_id: u16,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            sessions: StickyMap::new(),
            next_observer_id: 1,
        }
    }

    /// Registers a newly connected peer and hands back the observer id the
    /// caller should `track`/`set_owner` its entity with.
    pub fn connect(&mut self, peer_handle: PeerHandle, owned_entity_id: EntityId) -> ObserverId {
        let observer_id = ObserverId(self.next_observer_id);
        self.next_observer_id = self.next_observer_id.wrapping_add(1).max(1);

        self.sessions.insert(
            peer_handle,
            PeerSession {
                peer_handle,
                observer_id,
                owned_entity_id,
                connection_state: ConnectionState::Pending,
                consecutive_malformed: 0,
            },
        );
        observer_id
    }

    pub fn mark_ready(&mut self, peer_handle: PeerHandle) {
        if let Some(session) = self.get_mut(peer_handle) {
            session.connection_state = ConnectionState::Ready;
        }
    }

    pub fn mark_leaving(&mut self, peer_handle: PeerHandle) {
        if let Some(session) = self.get_mut(peer_handle) {
            session.connection_state = ConnectionState::Leaving;
        }
    }

    pub fn disconnect(&mut self, peer_handle: PeerHandle) -> Option<PeerSession> {
        self.sessions.remove(&peer_handle)
    }

    pub fn get(&self, peer_handle: PeerHandle) -> Option<&PeerSession> {
        self.sessions.get(&peer_handle)
    }

    pub fn get_mut(&mut self, peer_handle: PeerHandle) -> Option<&mut PeerSession> {
        self.sessions.get_mut(&peer_handle)
    }

    /// A consecutive malformed/unknown frame was received; returns `true` if
    /// the peer has now crossed the three-strikes disconnect threshold.
    pub fn record_malformed(&mut self, peer_handle: PeerHandle) -> bool {
        if let Some(session) = self.get_mut(peer_handle) {
            session.consecutive_malformed += 1;
            session.consecutive_malformed >= 3
        } else {
            false
        }
    }

    pub fn record_well_formed(&mut self, peer_handle: PeerHandle) {
        if let Some(session) = self.get_mut(peer_handle) {
            session.consecutive_malformed = 0;
        }
    }

    pub fn iter_ready(&mut self) -> impl Iterator<Item = &PeerSession> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.connection_state == ConnectionState::Ready)
            .map(|(_, session)| session)
    }

    pub fn iter_leaving(&mut self) -> impl Iterator<Item = &PeerSession> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.connection_state == ConnectionState::Leaving)
            .map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_ids_are_monotone_and_never_zero() {
        let mut table = PeerTable::new();
        let a = table.connect(PeerHandle(1), EntityId::from_raw(1));
        let b = table.connect(PeerHandle(2), EntityId::from_raw(2));
        assert_ne!(a, ObserverId::NONE);
        assert_ne!(b, ObserverId::NONE);
        assert!(b.as_u16() > a.as_u16());
    }

    #[test]
    fn three_consecutive_malformed_frames_trips_disconnect() {
        let mut table = PeerTable::new();
        table.connect(PeerHandle(1), EntityId::from_raw(1));

        assert!(!table.record_malformed(PeerHandle(1)));
        assert!(!table.record_malformed(PeerHandle(1)));
        assert!(table.record_malformed(PeerHandle(1)));
    }

    #[test]
    fn well_formed_frame_resets_the_counter() {
        let mut table = PeerTable::new();
        table.connect(PeerHandle(1), EntityId::from_raw(1));

        assert!(!table.record_malformed(PeerHandle(1)));
        table.record_well_formed(PeerHandle(1));
        assert!(!table.record_malformed(PeerHandle(1)));
        assert!(!table.record_malformed(PeerHandle(1)));
    }

    #[test]
    fn disconnect_removes_session() {
        let mut table = PeerTable::new();
        table.connect(PeerHandle(1), EntityId::from_raw(1));
        assert!(table.disconnect(PeerHandle(1)).is_some());
        assert!(table.get(PeerHandle(1)).is_none());
    }

}
