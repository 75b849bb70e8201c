//! Pure spatial index mapping world coordinates to chunk ids and back.
//!
//! A [`ChunkGrid`] holds nothing but the three size parameters from the CLI
//! (`--block-size`, `--chunk-size`, `--world-size`); every function here is a
//! deterministic, side-effect-free computation over them.

pub type ChunkId = u32;

/// Sentinel chunk id for coordinates outside the world rectangle, or for an
/// entity that has been taken out of the world via `set_chunk(CHUNK_NONE)`.
pub const CHUNK_NONE: ChunkId = ChunkId::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGrid {
    block_size: u16,
    chunk_size: u16,
    world_size: u16,
}

impl ChunkGrid {
    pub fn new(block_size: u16, chunk_size: u16, world_size: u16) -> Self {
        assert!(world_size > 0, "world_size must be at least 1");
        Self {
            block_size,
            chunk_size,
            world_size,
        }
    }

    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    pub fn world_size(&self) -> u16 {
        self.world_size
    }

    /// World units spanned by one chunk along either axis.
    fn cell_size(&self) -> i64 {
        self.block_size as i64 * self.chunk_size as i64
    }

    /// Offset (in chunks) from the grid's corner to its centered midpoint.
    fn half(&self) -> i64 {
        self.world_size as i64 / 2
    }

    /// Maps a world coordinate to the chunk containing it, or [`CHUNK_NONE`] if
    /// `(x, y)` falls outside the centered world rectangle.
    pub fn chunk_from_world(&self, x: i32, y: i32) -> ChunkId {
        let cell = self.cell_size();
        let half = self.half();
        let cx = (x as i64).div_euclid(cell) + half;
        let cy = (y as i64).div_euclid(cell) + half;

        let world_size = self.world_size as i64;
        if cx < 0 || cx >= world_size || cy < 0 || cy >= world_size {
            return CHUNK_NONE;
        }

        (cy * world_size + cx) as ChunkId
    }

    fn coords_of(&self, chunk_id: ChunkId) -> Option<(i64, i64)> {
        if chunk_id == CHUNK_NONE {
            return None;
        }
        let world_size = self.world_size as i64;
        let chunk_id = chunk_id as i64;
        if chunk_id < 0 || chunk_id >= world_size * world_size {
            return None;
        }
        Some((chunk_id % world_size, chunk_id / world_size))
    }

    /// Returns the `[x0, x1) x [y0, y1)` world-space rectangle a chunk covers.
    /// Panics if `chunk_id` is [`CHUNK_NONE`] or otherwise out of range — callers
    /// are expected to have obtained `chunk_id` from this grid already.
    pub fn chunk_bounds(&self, chunk_id: ChunkId) -> (i32, i32, i32, i32) {
        let (cx, cy) = self
            .coords_of(chunk_id)
            .expect("chunk_bounds called with an invalid chunk id");
        let cell = self.cell_size();
        let half = self.half();

        let x0 = (cx - half) * cell;
        let y0 = (cy - half) * cell;
        (x0 as i32, y0 as i32, (x0 + cell) as i32, (y0 + cell) as i32)
    }

    /// All chunk ids within Chebyshev distance `radius` of `chunk_id`, clipped
    /// to the grid. Returns an empty vector for [`CHUNK_NONE`].
    pub fn neighbors(&self, chunk_id: ChunkId, radius: u16) -> Vec<ChunkId> {
        let Some((cx, cy)) = self.coords_of(chunk_id) else {
            return Vec::new();
        };
        let world_size = self.world_size as i64;
        let radius = radius as i64;

        let mut out = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dy in -radius..=radius {
            let ny = cy + dy;
            if ny < 0 || ny >= world_size {
                continue;
            }
            for dx in -radius..=radius {
                let nx = cx + dx;
                if nx < 0 || nx >= world_size {
                    continue;
                }
                out.push((ny * world_size + nx) as ChunkId);
            }
        }
        out
    }
}
