//! CLI command implementations for cfgtrail.

pub mod config;
pub mod process;
