//! CLI subcommand implementations

pub mod list;
pub mod pack;
pub mod unpack;
