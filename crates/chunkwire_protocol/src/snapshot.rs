//! Fixed-schema entity snapshot sub-codec used inside a TRACKER_UPDATE blob.
//!
//! Unlike the outer frame (self-describing MessagePack), records here have a fixed wire
//! size per record kind so the interest tracker can compute exactly how many bytes the
//! next record will cost before deciding whether it fits the remaining buffer.

use chunkwire_binary::slice_serialization::{FixedBlob, LittleEndian, SliceSerializable};

pub const MAX_EXTRA_BYTES: usize = 32;

/// `{ x:i16, y:i16, kind:u8, extra:bytes[<=32] }`, always written as a fixed 37-byte record
/// (the extra tail is zero-padded, never length-prefixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub x: i16,
    pub y: i16,
    pub kind: u8,
    pub extra_len: u8,
    pub extra: [u8; MAX_EXTRA_BYTES],
}

pub const SNAPSHOT_WIRE_SIZE: usize = 2 + 2 + 1 + 1 + MAX_EXTRA_BYTES;

impl EntitySnapshot {
    pub fn new(x: i16, y: i16, kind: u8, extra: &[u8]) -> Self {
        debug_assert!(extra.len() <= MAX_EXTRA_BYTES, "extra payload exceeds 32 bytes");
        let mut padded = [0u8; MAX_EXTRA_BYTES];
        let len = extra.len().min(MAX_EXTRA_BYTES);
        padded[..len].copy_from_slice(&extra[..len]);
        Self {
            x,
            y,
            kind,
            extra_len: len as u8,
            extra: padded,
        }
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra[..self.extra_len as usize]
    }

    fn write(&self, bytes: &mut [u8]) {
        debug_assert!(bytes.len() >= SNAPSHOT_WIRE_SIZE);
        let mut cursor: &mut [u8] = bytes;
        cursor = unsafe { <LittleEndian as SliceSerializable<i16>>::write(cursor, self.x) };
        cursor = unsafe { <LittleEndian as SliceSerializable<i16>>::write(cursor, self.y) };
        cursor = unsafe { <LittleEndian as SliceSerializable<u8>>::write(cursor, self.kind) };
        cursor = unsafe { <LittleEndian as SliceSerializable<u8>>::write(cursor, self.extra_len) };
        cursor[..MAX_EXTRA_BYTES].copy_from_slice(&self.extra);
    }

    fn read(bytes: &mut &[u8]) -> anyhow::Result<Self> {
        let x: i16 = <LittleEndian as SliceSerializable<i16>>::read(bytes)?;
        let y: i16 = <LittleEndian as SliceSerializable<i16>>::read(bytes)?;
        let kind: u8 = <LittleEndian as SliceSerializable<u8>>::read(bytes)?;
        let extra_len: u8 = <LittleEndian as SliceSerializable<u8>>::read(bytes)?;

        let extra_tail = FixedBlob::<MAX_EXTRA_BYTES>::read_exact(bytes, MAX_EXTRA_BYTES)?;
        let mut extra = [0u8; MAX_EXTRA_BYTES];
        extra.copy_from_slice(extra_tail);

        Ok(Self {
            x,
            y,
            kind,
            extra_len,
            extra,
        })
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOp {
    Remove = 0,
    Create = 1,
    Update = 2,
}

impl RecordOp {
    fn from_byte(byte: u8) -> anyhow::Result<Self> {
        match byte {
            0 => Ok(RecordOp::Remove),
            1 => Ok(RecordOp::Create),
            2 => Ok(RecordOp::Update),
            other => anyhow::bail!("unknown tracker record op {other}"),
        }
    }
}

pub const REMOVE_RECORD_WIRE_SIZE: usize = 1 + 8;
pub const SNAPSHOT_RECORD_WIRE_SIZE: usize = 1 + 8 + SNAPSHOT_WIRE_SIZE;

/// Returns the exact number of bytes `op` would occupy on the wire, before attempting to
/// write it. The tracker's write loop uses this to implement the partial-write rule without
/// ever emitting a truncated record.
pub fn record_wire_size(op: RecordOp) -> usize {
    match op {
        RecordOp::Remove => REMOVE_RECORD_WIRE_SIZE,
        RecordOp::Create | RecordOp::Update => SNAPSHOT_RECORD_WIRE_SIZE,
    }
}

/// Writes one record into `bytes`. Caller must have already checked `bytes.len() >=
/// record_wire_size(op)`. Returns the number of bytes written.
pub fn write_record(
    bytes: &mut [u8],
    op: RecordOp,
    entity_id: u64,
    snapshot: Option<&EntitySnapshot>,
) -> usize {
    let size = record_wire_size(op);
    debug_assert!(bytes.len() >= size, "caller must pre-check remaining buffer space");

    let mut cursor: &mut [u8] = bytes;
    cursor = unsafe { <LittleEndian as SliceSerializable<u8>>::write(cursor, op as u8) };
    cursor = unsafe { <LittleEndian as SliceSerializable<u64>>::write(cursor, entity_id) };

    if let Some(snapshot) = snapshot {
        debug_assert!(matches!(op, RecordOp::Create | RecordOp::Update));
        snapshot.write(cursor);
    }

    size
}

/// One decoded record from a TRACKER_UPDATE blob, as consumed by the client mirror's read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerRecord {
    Remove { entity_id: u64 },
    Create { entity_id: u64, snapshot: EntitySnapshot },
    Update { entity_id: u64, snapshot: EntitySnapshot },
}

impl TrackerRecord {
    pub fn entity_id(&self) -> u64 {
        match self {
            TrackerRecord::Remove { entity_id }
            | TrackerRecord::Create { entity_id, .. }
            | TrackerRecord::Update { entity_id, .. } => *entity_id,
        }
    }
}

fn read_record(bytes: &mut &[u8]) -> anyhow::Result<TrackerRecord> {
    let op_byte: u8 = <LittleEndian as SliceSerializable<u8>>::read(bytes)?;
    let op = RecordOp::from_byte(op_byte)?;
    let entity_id: u64 = <LittleEndian as SliceSerializable<u64>>::read(bytes)?;

    match op {
        RecordOp::Remove => Ok(TrackerRecord::Remove { entity_id }),
        RecordOp::Create => Ok(TrackerRecord::Create {
            entity_id,
            snapshot: EntitySnapshot::read(bytes)?,
        }),
        RecordOp::Update => Ok(TrackerRecord::Update {
            entity_id,
            snapshot: EntitySnapshot::read(bytes)?,
        }),
    }
}

/// Iterates every record in a TRACKER_UPDATE blob, in wire order (REMOVEs, then CREATEs,
/// then UPDATEs — the tracker's write algorithm is responsible for that ordering; this
/// reader makes no assumption about it and simply replays whatever order it finds).
pub struct RecordIter<'a> {
    bytes: &'a [u8],
}

pub fn read_records(bytes: &[u8]) -> RecordIter<'_> {
    RecordIter { bytes }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = anyhow::Result<TrackerRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        Some(read_record(&mut self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let snapshot = EntitySnapshot::new(12, -7, 3, b"hello");
        let mut buf = [0u8; SNAPSHOT_WIRE_SIZE];
        snapshot.write(&mut buf);

        let mut cursor = &buf[..];
        let read_back = EntitySnapshot::read(&mut cursor).unwrap();
        assert_eq!(read_back, snapshot);
        assert_eq!(read_back.extra(), b"hello");
        assert!(cursor.is_empty());
    }

    #[test]
    fn stream_round_trips_in_order() {
        let snapshot = EntitySnapshot::new(1, 2, 0, &[]);
        let mut buf = vec![0u8; record_wire_size(RecordOp::Remove) + record_wire_size(RecordOp::Create)];

        let written = write_record(&mut buf, RecordOp::Remove, 5, None);
        write_record(&mut buf[written..], RecordOp::Create, 6, Some(&snapshot));

        let records: Vec<_> = read_records(&buf).map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], TrackerRecord::Remove { entity_id: 5 });
        assert_eq!(
            records[1],
            TrackerRecord::Create {
                entity_id: 6,
                snapshot
            }
        );
    }
}
