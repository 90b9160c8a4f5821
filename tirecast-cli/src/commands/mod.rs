//! CLI subcommands.

pub mod cleanup;
pub mod config;
pub mod replay;
pub mod stats;
pub mod train;
