//! Audit store backends and the append-only audit sink.

use async_trait::async_trait;
use cfgtrail_core::config::{StorageBackend, StoreConfig};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::AuditError;
use crate::record::AuditRecord;

/// Trait for audit store backends.
///
/// Stores only ever receive new rows. There is no update, delete or
/// read-modify-write path.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert a record keyed by its id. Must refuse to overwrite an existing
    /// row with the same id.
    async fn put_new(&self, record: &AuditRecord) -> Result<(), AuditError>;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create a store backend based on configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn AuditStore>, AuditError> {
    match config.backend {
        StorageBackend::File => Ok(Arc::new(FileStore::open(config.table_path())?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// In-process store.
///
/// Keeps every record in memory. Writes can be switched off to simulate an
/// unreachable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<AuditRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (`true`) or succeed again (`false`).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the stored records, in write order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn put_new(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuditError::unavailable("memory store is refusing writes"));
        }

        let mut records = self.lock();
        if records.iter().any(|r| r.id() == record.id()) {
            return Err(AuditError::unavailable(format!(
                "conditional put rejected: record {} already exists",
                record.id()
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// File store (appends JSON Lines to the table file).
pub struct FileStore {
    path: PathBuf,
    // Ids already in the file, so a collision is caught across restarts.
    ids: Mutex<HashSet<Uuid>>,
}

impl FileStore {
    /// Open the table file, creating its directory when needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::debug!(path = %parent.display(), "Creating audit store directory");
                fs::create_dir_all(parent)?;
            }
        }

        Self::seal_torn_tail(&path)?;
        let ids = Self::load_ids(&path)?;
        tracing::info!(path = %path.display(), records = ids.len(), "Opened audit table");

        Ok(Self {
            path,
            ids: Mutex::new(ids),
        })
    }

    // A crash mid-append can leave a final row without its newline. Close it
    // off so the next append starts on a fresh line.
    fn seal_torn_tail(path: &Path) -> Result<(), AuditError> {
        if !path.exists() {
            return Ok(());
        }

        let mut file = OpenOptions::new().read(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            tracing::warn!(path = %path.display(), "Audit table ends with a partial row");
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    fn load_ids(path: &Path) -> Result<HashSet<Uuid>, AuditError> {
        let mut ids = HashSet::new();
        if !path.exists() {
            return Ok(ids);
        }

        let reader = BufReader::new(fs::File::open(path)?);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => {
                    ids.insert(record.id());
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable audit row"
                    );
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl AuditStore for FileStore {
    async fn put_new(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let json = serde_json::to_string(record)?;

        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if ids.contains(&record.id()) {
            return Err(AuditError::unavailable(format!(
                "conditional put rejected: record {} already exists",
                record.id()
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                AuditError::unavailable(format!("cannot open {}: {}", self.path.display(), e))
            })?;
        // One write per row; a failed write is cut back to the previous length
        // so no half row is left behind.
        let prev_len = file.metadata()?.len();
        let line = format!("{}\n", json);
        if let Err(e) = file.write_all(line.as_bytes()) {
            if let Err(truncate_err) = file.set_len(prev_len) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %truncate_err,
                    "Could not roll back partial audit row"
                );
            }
            return Err(AuditError::unavailable(format!(
                "cannot append to {}: {}",
                self.path.display(),
                e
            )));
        }

        ids.insert(record.id());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Append-only writer of audit records into an injected store.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
    region: String,
    table: String,
}

impl AuditSink {
    /// Create a sink over an explicit store handle.
    pub fn new(store: Arc<dyn AuditStore>, region: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            store,
            region: region.into(),
            table: table.into(),
        }
    }

    /// Create the configured store and wrap it in a sink.
    pub fn from_config(config: &StoreConfig) -> Result<Self, AuditError> {
        let store = create_store(config)?;
        Ok(Self::new(store, config.region.clone(), config.table.clone()))
    }

    /// Append a record as a new row keyed by its id.
    pub async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::debug!(
            record_id = %record.id(),
            item_key = %record.item_key(),
            region = %self.region,
            table = %self.table,
            backend = self.store.name(),
            "Appending audit record"
        );

        self.store.put_new(&record).await
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}
