//! Tick loop, interest tracker, entity registry and peer sessions for the replication core.
//!
//! This crate owns the pure chunk-grid math, the `bevy_ecs`-backed entity registry, the
//! per-observer interest tracker, the peer session table, and the tick loop that drives all of
//! them against a [`chunkwire_net::Transport`].

pub mod chunk_grid;
pub mod config;
pub mod entity;
pub mod error;
pub mod peer;
pub mod tick;
pub mod tracker;
