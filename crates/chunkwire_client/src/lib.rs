//! Client-side world mirror: consumes a TRACKER_UPDATE blob and reconstructs a local
//! `entity_id -> view_record` table. Rendering itself is out of scope; this crate only owns
//! the table and a small linear-interpolation helper for the coarser-than-render replication
//! cadence.

use indexmap::IndexMap;
use thiserror::Error;

use chunkwire_protocol::snapshot::{self, EntitySnapshot, TrackerRecord};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("malformed tracker record: {0}")]
    MalformedRecord(#[source] anyhow::Error),
}

/// The client-side mirror of a single remote entity. Tracks the last two observed positions
/// so callers can interpolate between replication ticks instead of snapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRecord {
    pub x: i16,
    pub y: i16,
    pub kind: u8,
    pub extra_len: u8,
    pub extra: [u8; snapshot::MAX_EXTRA_BYTES],
    prev_x: i16,
    prev_y: i16,
}

impl ViewRecord {
    fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        Self {
            x: snapshot.x,
            y: snapshot.y,
            kind: snapshot.kind,
            extra_len: snapshot.extra_len,
            extra: snapshot.extra,
            prev_x: snapshot.x,
            prev_y: snapshot.y,
        }
    }

    /// Applies an UPDATE record's fields in place, remembering the previous position as the
    /// interpolation anchor. Matches the read algorithm's "merge fields" step; since the
    /// snapshot schema is fixed there are no unknown keys to tolerate today, but every field
    /// is still merged individually rather than via struct replacement so a future optional
    /// field can be added without every caller needing to change.
    fn merge_snapshot(&mut self, snapshot: &EntitySnapshot) {
        self.prev_x = self.x;
        self.prev_y = self.y;
        self.x = snapshot.x;
        self.y = snapshot.y;
        self.kind = snapshot.kind;
        self.extra_len = snapshot.extra_len;
        self.extra = snapshot.extra;
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra[..self.extra_len as usize]
    }

    /// Linearly interpolates between the last two observed positions. `alpha` is clamped to
    /// `[0, 1]`; `0` is the previous position, `1` is the current one.
    pub fn interpolated_position(&self, alpha: f32) -> (f32, f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        let x = self.prev_x as f32 + (self.x as f32 - self.prev_x as f32) * alpha;
        let y = self.prev_y as f32 + (self.y as f32 - self.prev_y as f32) * alpha;
        (x, y)
    }
}

/// Holds the client's current view of every entity it has been told about, in insertion
/// order (iteration stability matters for renderers that want stable draw ordering).
#[derive(Debug, Default)]
pub struct ClientMirror {
    entities: IndexMap<u64, ViewRecord>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, entity_id: u64, view: ViewRecord) {
        self.entities.insert(entity_id, view);
    }

    pub fn destroy(&mut self, entity_id: u64) -> Option<ViewRecord> {
        self.entities.shift_remove(&entity_id)
    }

    pub fn get(&self, entity_id: u64) -> Option<&ViewRecord> {
        self.entities.get(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &ViewRecord)> {
        self.entities.iter()
    }

    /// Replays one TRACKER_UPDATE blob's records in wire order.
    /// REMOVE deletes from the local view; CREATE inserts (overwriting if already present,
    /// so replaying a CREATE is idempotent); UPDATE merges onto an existing record, or is
    /// treated as a CREATE if the entity isn't locally known yet -- a client that missed an
    /// earlier CREATE (e.g. it just connected mid-stream) should still converge rather than
    /// silently drop the entity forever. Returns the number of records applied.
    pub fn apply(&mut self, bytes: &[u8]) -> Result<usize, MirrorError> {
        let mut applied = 0usize;
        for record in snapshot::read_records(bytes) {
            let record = match record {
                Ok(record) => record,
                Err(source) => {
                    tracing::warn!(%source, "dropping malformed tracker record");
                    return Err(MirrorError::MalformedRecord(source));
                }
            };
            match record {
                TrackerRecord::Remove { entity_id } => {
                    self.destroy(entity_id);
                }
                TrackerRecord::Create { entity_id, snapshot } => {
                    self.upsert(entity_id, ViewRecord::from_snapshot(&snapshot));
                }
                TrackerRecord::Update { entity_id, snapshot } => {
                    if let Some(existing) = self.entities.get_mut(&entity_id) {
                        existing.merge_snapshot(&snapshot);
                    } else {
                        self.upsert(entity_id, ViewRecord::from_snapshot(&snapshot));
                    }
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}
