//! CLI-derived world configuration.

use clap::Parser;
use rand::Rng;

use crate::chunk_grid::ChunkGrid;

pub const DEFAULT_REPLICATION_PERIOD_MS: u64 = 100;

#[derive(Debug, Clone, Parser)]
#[clap(name = "chunkwire-server", about = "Authoritative world-replication core")]
pub struct WorldConfig {
    /// World-generation seed. Ignored if `--random-seed` is set.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// Pick a fresh random seed on startup instead of `--seed`.
    #[clap(long)]
    pub random_seed: bool,

    /// World units spanned by one block.
    #[clap(long, default_value_t = 64)]
    pub block_size: u16,

    /// Blocks spanned by one chunk, along either axis.
    #[clap(long, default_value_t = 3)]
    pub chunk_size: u16,

    /// Chunks spanned by the world, along either axis. The grid is centered
    /// on the origin.
    #[clap(long, default_value_t = 8)]
    pub world_size: u16,

    /// UDP port the transport listens on.
    #[clap(long, default_value_t = 27000)]
    pub port: u16,

    /// Default Chebyshev-distance visibility radius, in chunks, for newly
    /// tracked entities.
    #[clap(long, default_value_t = 2)]
    pub chunk_view_radius: u16,

    /// Interval between replication writes, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_REPLICATION_PERIOD_MS)]
    pub replication_period_ms: u64,

    /// Render an ASCII occupancy grid of the world to stdout and exit,
    /// instead of starting the server.
    #[clap(long)]
    pub preview_map: bool,
}

impl WorldConfig {
    /// The seed actually in effect: `--random-seed` overrides `--seed`.
    pub fn effective_seed(&self) -> u64 {
        if self.random_seed {
            rand::thread_rng().gen()
        } else {
            self.seed
        }
    }

    pub fn chunk_grid(&self) -> ChunkGrid {
        ChunkGrid::new(self.block_size, self.chunk_size, self.world_size)
    }
}
