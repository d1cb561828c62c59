//! `cfgtrail process` command implementation.
//!
//! Reads one stream batch, routes it into the configured audit store and
//! prints the batch outcome as JSON on stdout.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use cfgtrail_audit::{AuditRouter, AuditSink, BatchOutcome, StreamBatch};
use cfgtrail_core::{FailurePolicy, StorageBackend, TrailConfig};

/// Options for a single `process` run.
#[derive(Debug, Default)]
pub struct ProcessOptions<'a> {
    /// Batch file; stdin when absent or `-`.
    pub input: Option<&'a Path>,
    /// Route into memory instead of the configured store.
    pub dry_run: bool,
    /// Force the isolate failure policy.
    pub isolate: bool,
}

pub async fn run_process(mut config: TrailConfig, options: ProcessOptions<'_>) -> Result<BatchOutcome> {
    if options.dry_run {
        config.store.backend = StorageBackend::Memory;
    }
    if options.isolate {
        config.pipeline.failure_policy = FailurePolicy::Isolate;
    }

    let payload = read_payload(options.input)?;
    let batch = StreamBatch::from_json(&payload).context("Failed to parse stream batch")?;

    let sink = AuditSink::from_config(&config.store).with_context(|| {
        format!(
            "Failed to open {} audit store for table '{}'",
            config.store.backend, config.store.table
        )
    })?;
    let router = AuditRouter::new(sink, config.pipeline.failure_policy);

    let outcome = router
        .route(&batch)
        .await
        .context("Batch failed and should be redelivered")?;

    if !outcome.is_clean() {
        tracing::warn!(failed = outcome.failed.len(), "Some events were skipped as failed");
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

fn read_payload(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read batch file {}", path.display())),
        _ => {
            let mut payload = String::new();
            std::io::stdin()
                .read_to_string(&mut payload)
                .context("Failed to read batch from stdin")?;
            Ok(payload)
        }
    }
}
