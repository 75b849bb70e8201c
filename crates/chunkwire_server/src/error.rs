//! Leaf error types for this crate; composed at the call site with `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("frame decode failed for peer {peer}: {source}")]
    MalformedFrame {
        peer: u64,
        #[source]
        source: anyhow::Error,
    },
}
