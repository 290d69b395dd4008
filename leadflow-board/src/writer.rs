//! Batch Position Writer.
//!
//! Filters a set of position assignments down to the ones that can be
//! written, then submits them as one store batch. Bad entries are skipped
//! individually; only a store failure fails the call. A column transition is
//! written inside the same batch as the positions it implies.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use leadflow_core::{
    BoardConfig, LeadId, LeadflowError, LeadflowResult, Position, PositionUpdate, StatusChange,
    StorageError, Timestamp, WritePolicy,
};
use leadflow_storage::{encode_position, encode_status_move, DocumentStore, DocumentWrite};
use tracing::{debug, error, info, warn};

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Why an entry was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Empty, placeholder or otherwise unusable identifier.
    InvalidId,
    /// Negative position.
    InvalidPosition,
    /// Same id earlier in the batch.
    Duplicate,
    /// Target no longer exists in the store.
    Missing,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::InvalidId => "invalid id",
            SkipReason::InvalidPosition => "invalid position",
            SkipReason::Duplicate => "duplicate",
            SkipReason::Missing => "missing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUpdate {
    pub id: LeadId,
    pub position: Position,
    pub reason: SkipReason,
}

/// Outcome of a batch that reached (or did not need) the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchWriteReport {
    pub applied_count: usize,
    /// Ids that were written, in batch order.
    pub applied_ids: Vec<LeadId>,
    pub skipped: Vec<SkippedUpdate>,
    /// Timestamp written as `lastActivity`; `None` when nothing was written.
    pub written_at: Option<Timestamp>,
}

impl BatchWriteReport {
    pub fn skipped_ids(&self) -> Vec<&LeadId> {
        self.skipped.iter().map(|s| &s.id).collect()
    }
}

// ============================================================================
// WRITER
// ============================================================================

/// Persists position assignments for one collection.
#[derive(Debug)]
pub struct BatchPositionWriter<S: ?Sized> {
    store: Arc<S>,
    collection: String,
    policy: WritePolicy,
    sentinels: Vec<String>,
}

impl<S: ?Sized> Clone for BatchPositionWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            policy: self.policy,
            sentinels: self.sentinels.clone(),
        }
    }
}

impl<S> BatchPositionWriter<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: &BoardConfig) -> Self {
        Self {
            store,
            collection: config.collection.clone(),
            policy: config.write_policy,
            sentinels: config.invalid_id_sentinels.clone(),
        }
    }

    /// Write `updates` as one batch.
    ///
    /// Each entry is checked for a usable id, a non-negative position and a
    /// first occurrence in the batch. Under [`WritePolicy::VerifyExisting`]
    /// entries whose document is gone are skipped; under
    /// [`WritePolicy::Upsert`] they are merge-written. A target deleted
    /// between that check and the write is skipped too, and the rest of the
    /// batch is submitted once more. Every written lead also gets
    /// `lastActivity` set to the write time.
    pub async fn write_batch(&self, updates: &[PositionUpdate]) -> LeadflowResult<BatchWriteReport> {
        self.write_move(updates, None).await
    }

    /// [`write_batch`](Self::write_batch) with a column transition folded in.
    ///
    /// The moved lead's entry carries its new status, so the status and every
    /// position land together or not at all. If `updates` has no entry for
    /// the moved lead, one is added from the change itself.
    pub async fn write_move(
        &self,
        updates: &[PositionUpdate],
        status_change: Option<&StatusChange>,
    ) -> LeadflowResult<BatchWriteReport> {
        let mut entries: Vec<PositionUpdate> = Vec::with_capacity(updates.len() + 1);
        if let Some(change) = status_change {
            if !updates.iter().any(|u| u.id == change.id) {
                entries.push(PositionUpdate::new(change.id.clone(), change.position));
            }
        }
        entries.extend_from_slice(updates);

        let mut report = BatchWriteReport::default();
        let mut seen = HashSet::new();
        let mut valid: Vec<&PositionUpdate> = Vec::with_capacity(entries.len());

        for update in &entries {
            let reason = if let Err(e) = update.id.validate_against(&self.sentinels) {
                warn!(lead_id = %update.id, error = %e, "skipping position update");
                Some(SkipReason::InvalidId)
            } else if update.position < 0 {
                warn!(lead_id = %update.id, position = update.position, "skipping negative position");
                Some(SkipReason::InvalidPosition)
            } else if !seen.insert(&update.id) {
                warn!(lead_id = %update.id, "skipping repeated id in batch");
                Some(SkipReason::Duplicate)
            } else {
                None
            };
            match reason {
                Some(reason) => report.skipped.push(SkippedUpdate {
                    id: update.id.clone(),
                    position: update.position,
                    reason,
                }),
                None => valid.push(update),
            }
        }

        if self.policy == WritePolicy::VerifyExisting {
            valid = self.retain_existing(valid, &mut report.skipped).await?;
        }

        if valid.is_empty() {
            debug!(skipped = report.skipped.len(), "nothing to write");
            return Ok(report);
        }

        let now = Utc::now().trunc_subsecs(3);
        let submitted = self.submit(&valid, status_change, now).await;
        if let Err(e) = submitted {
            // A target deleted after the existence check rejects the whole
            // batch. Drop whatever has vanished and try once more.
            if self.policy != WritePolicy::VerifyExisting
                || !matches!(e, LeadflowError::Storage(StorageError::BatchFailed { .. }))
            {
                return Err(e);
            }
            let before = valid.len();
            valid = self.retain_existing(valid, &mut report.skipped).await?;
            if valid.len() == before {
                return Err(e);
            }
            warn!(
                collection = %self.collection,
                vanished = before - valid.len(),
                "targets deleted mid-batch; resubmitting the rest"
            );
            if valid.is_empty() {
                return Ok(report);
            }
            self.submit(&valid, status_change, now).await?;
        }

        report.applied_count = valid.len();
        report.applied_ids = valid.iter().map(|u| u.id.clone()).collect();
        report.written_at = Some(now);
        if let Some(change) = status_change.filter(|c| report.applied_ids.contains(&c.id)) {
            info!(lead_id = %change.id, from = %change.from, to = %change.to, "status changed");
        }
        info!(
            collection = %self.collection,
            applied = report.applied_count,
            skipped = report.skipped.len(),
            "position batch written"
        );
        Ok(report)
    }

    /// Keep the entries whose document still exists; record the rest as
    /// [`SkipReason::Missing`]. A lookup failure fails the call.
    async fn retain_existing<'a>(
        &self,
        candidates: Vec<&'a PositionUpdate>,
        skipped: &mut Vec<SkippedUpdate>,
    ) -> LeadflowResult<Vec<&'a PositionUpdate>> {
        let mut existing = Vec::with_capacity(candidates.len());
        for update in candidates {
            match self.store.get_by_id(&self.collection, update.id.as_str()).await? {
                Some(_) => existing.push(update),
                None => {
                    debug!(lead_id = %update.id, "target gone; skipping");
                    skipped.push(SkippedUpdate {
                        id: update.id.clone(),
                        position: update.position,
                        reason: SkipReason::Missing,
                    });
                }
            }
        }
        Ok(existing)
    }

    async fn submit(
        &self,
        entries: &[&PositionUpdate],
        status_change: Option<&StatusChange>,
        now: Timestamp,
    ) -> LeadflowResult<()> {
        let writes: Vec<DocumentWrite> = entries
            .iter()
            .map(|u| {
                let fields = match status_change {
                    Some(change) if change.id == u.id => {
                        encode_status_move(&change.to, u.position, now)
                    }
                    _ => encode_position(u.position, now),
                };
                match self.policy {
                    WritePolicy::VerifyExisting => DocumentWrite::update(u.id.as_str(), fields),
                    WritePolicy::Upsert => DocumentWrite::merge(u.id.as_str(), fields),
                }
            })
            .collect();
        let size = writes.len();

        if let Err(e) = self.store.batch_write(&self.collection, writes).await {
            error!(collection = %self.collection, size, error = %e, "position batch failed");
            return Err(e);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
