//! # cfgtrail-core
//!
//! Configuration types shared across the cfgtrail crates.
//!
//! The audit pipeline needs to know where the audit store lives (backend,
//! region label, table name, directory) and how a batch reacts to a failing
//! event. Both are described by [`TrailConfig`], loaded from an optional YAML
//! file and then overridden from the environment.

pub mod config;

pub use config::{
    ConfigError, FailurePolicy, PipelineConfig, StorageBackend, StoreConfig, TrailConfig,
};
