//! Change event router.
//!
//! Walks a batch in delivery order, builds the matching audit record for
//! every creation and modification, and appends it through the sink. Other
//! operation kinds are logged and skipped.

use cfgtrail_core::config::FailurePolicy;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuditError;
use crate::event::ChangeEvent;
use crate::record::AuditRecordBuilder;
use crate::storage::AuditSink;
use crate::stream::StreamBatch;

/// What happened to the events of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Ids of the records written, in write order.
    pub written: Vec<Uuid>,
    /// Events skipped because their operation kind is not audited.
    pub skipped: usize,
    /// Events that failed under the isolate policy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedEvent>,
}

impl BatchOutcome {
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    /// Whether every event was written or deliberately skipped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An event that could not be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEvent {
    /// Position of the event in its batch.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub error: String,
}

enum Handled {
    Written(Uuid),
    Skipped,
}

/// Classifies change events and dispatches them to the builder and sink.
#[derive(Clone)]
pub struct AuditRouter {
    builder: AuditRecordBuilder,
    sink: AuditSink,
    policy: FailurePolicy,
}

impl AuditRouter {
    /// Create a router with the default record builder.
    pub fn new(sink: AuditSink, policy: FailurePolicy) -> Self {
        Self::with_builder(AuditRecordBuilder::new(), sink, policy)
    }

    /// Create a router with an explicit record builder.
    pub fn with_builder(builder: AuditRecordBuilder, sink: AuditSink, policy: FailurePolicy) -> Self {
        Self {
            builder,
            sink,
            policy,
        }
    }

    /// Route one batch of stream records.
    ///
    /// Each entry is decoded on its own, so an unreadable record counts as a
    /// malformed event of this batch like any other. Under
    /// [`FailurePolicy::FailFast`] the first failing event aborts the batch
    /// and its error is returned. Records written before that point stay
    /// written.
    pub async fn route(&self, batch: &StreamBatch) -> Result<BatchOutcome, AuditError> {
        tracing::info!(
            records = batch.len(),
            policy = %self.policy,
            table = %self.sink.table(),
            "Routing change batch"
        );
        tracing::debug!(batch = ?batch, "Change batch payload");

        let mut outcome = BatchOutcome::default();
        for (index, entry) in batch.records.iter().enumerate() {
            let event_id = entry.event_id();
            let result = match entry.record().and_then(ChangeEvent::from_record) {
                Ok(event) => self.handle(&event, event_id).await,
                Err(err) => Err(err),
            };
            self.settle(&mut outcome, index, event_id, result)?;
        }

        self.finish(&outcome);
        Ok(outcome)
    }

    /// Route already-classified events. Same semantics as [`AuditRouter::route`].
    pub async fn route_events(&self, events: &[ChangeEvent]) -> Result<BatchOutcome, AuditError> {
        tracing::info!(
            records = events.len(),
            policy = %self.policy,
            table = %self.sink.table(),
            "Routing change events"
        );

        let mut outcome = BatchOutcome::default();
        for (index, event) in events.iter().enumerate() {
            let result = self.handle(event, None).await;
            self.settle(&mut outcome, index, None, result)?;
        }

        self.finish(&outcome);
        Ok(outcome)
    }

    async fn handle(&self, event: &ChangeEvent, event_id: Option<&str>) -> Result<Handled, AuditError> {
        tracing::debug!(event_id = event_id.unwrap_or("-"), kind = event.kind(), "Handling change event");

        let record = match event {
            ChangeEvent::Created { after } => {
                let record = self.builder.build_creation(after);
                tracing::info!(
                    event_id = event_id.unwrap_or("-"),
                    "New item: {}",
                    record.to_log_line()
                );
                record
            }
            ChangeEvent::Updated { before, after } => {
                let record = self.builder.build_modification(before, after);
                tracing::info!(
                    event_id = event_id.unwrap_or("-"),
                    "Modified item: {}",
                    record.to_log_line()
                );
                record
            }
            ChangeEvent::Other { kind } => {
                let reason = AuditError::UnhandledOperation(kind.clone());
                tracing::warn!(event_id = event_id.unwrap_or("-"), "{}", reason);
                return Ok(Handled::Skipped);
            }
        };

        let id = record.id();
        self.sink.append(record).await?;
        Ok(Handled::Written(id))
    }

    fn settle(
        &self,
        outcome: &mut BatchOutcome,
        index: usize,
        event_id: Option<&str>,
        result: Result<Handled, AuditError>,
    ) -> Result<(), AuditError> {
        match result {
            Ok(Handled::Written(id)) => outcome.written.push(id),
            Ok(Handled::Skipped) => outcome.skipped += 1,
            Err(err) => match self.policy {
                FailurePolicy::FailFast => {
                    tracing::error!(
                        index,
                        event_id = event_id.unwrap_or("-"),
                        written = outcome.written.len(),
                        retryable = err.is_retryable(),
                        error = %err,
                        "Aborting batch"
                    );
                    return Err(err);
                }
                FailurePolicy::Isolate => {
                    tracing::error!(
                        index,
                        event_id = event_id.unwrap_or("-"),
                        error = %err,
                        "Skipping failed event"
                    );
                    outcome.failed.push(FailedEvent {
                        index,
                        event_id: event_id.map(str::to_string),
                        error: err.to_string(),
                    });
                }
            },
        }
        Ok(())
    }

    fn finish(&self, outcome: &BatchOutcome) {
        tracing::info!(
            written = outcome.written.len(),
            skipped = outcome.skipped,
            failed = outcome.failed.len(),
            "Batch complete"
        );
    }
}
