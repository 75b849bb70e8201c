use std::net::SocketAddr;

use chunkwire_net::RenetTransport;
use chunkwire_server::chunk_grid::ChunkGrid;
use chunkwire_server::config::WorldConfig;
use chunkwire_server::tick::TickLoop;
use clap::Parser;

/// Renders the world's chunk occupancy as an ASCII grid to stdout. There is no terrain
/// generator in this crate, so every cell is simply "." — this exists to let a developer
/// confirm the grid shape (`world_size` x `world_size`, each cell `block_size * chunk_size`
/// world units) a given set of flags produces, without starting a network listener.
fn print_preview_map(grid: &ChunkGrid) {
    println!(
        "chunk grid: {}x{} chunks, {} world units per chunk",
        grid.world_size(),
        grid.world_size(),
        grid.block_size() as u32 * grid.chunk_size() as u32
    );
    for _ in 0..grid.world_size() {
        println!("{}", ".".repeat(grid.world_size() as usize));
    }
}

fn run(config: WorldConfig) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let transport = RenetTransport::bind(bind_addr, 64)?;
    let mut tick_loop = TickLoop::new(transport, (), &config);

    tracing::info!(
        port = config.port,
        seed = config.effective_seed(),
        "chunkwire demo server listening"
    );

    while tick_loop.is_running() {
        tick_loop.tick(50);
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match WorldConfig::try_parse() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(-1);
        }
    };

    if config.preview_map {
        print_preview_map(&config.chunk_grid());
        return;
    }

    if let Err(error) = run(config) {
        tracing::error!(%error, "chunkwire demo server failed to start");
        std::process::exit(1);
    }
}
