//! Audit store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the durable audit store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Storage backend type.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Region the audit store lives in. Carried as a label on every write.
    #[serde(default = "default_region")]
    pub region: String,

    /// Name of the audit dataset (table).
    #[serde(default = "default_table")]
    pub table: String,

    /// Directory holding the audit files (for the file backend).
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Append to a JSON Lines file.
    #[default]
    File,
    /// Keep records in process memory.
    Memory,
}

impl StorageBackend {
    /// Parse a backend name as found in the environment.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl StoreConfig {
    /// Path of the JSON Lines file backing the audit table.
    pub fn table_path(&self) -> PathBuf {
        self.directory.join(format!("{}.jsonl", self.table))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            region: default_region(),
            table: default_table(),
            directory: default_directory(),
        }
    }
}

fn default_region() -> String {
    "local".to_string()
}

fn default_table() -> String {
    "Audit".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("audit-data")
}
