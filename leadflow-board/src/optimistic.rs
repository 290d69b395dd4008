//! Optimistic State Updater.
//!
//! Holds the rendered lead collection. A drag is applied locally before any
//! network traffic; persistence runs on a spawned task as a single batch
//! carrying the new positions and, for a column change, the new status.
//!
//! A failed write is not rolled back by hand: after `refetch_delay` the
//! whole collection is reloaded from the store and replaces local state.
//!
//! Writes from rapid successive drags may complete out of order, and a late
//! write for an older drag can overwrite a newer one in the store. Only a
//! failure-triggered reload corrects that.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use leadflow_core::{
    BoardConfig, DragResult, Lead, LeadId, LeadStatus, LeadflowError, LeadflowResult,
    PositionUpdate, StatusChange, StorageError,
};
use leadflow_storage::{decode_lead, DocumentStore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backfill::{apply_positions, backfill, needs_init};
use crate::diagnostics::{scan_documents, ProblemReport};
use crate::partition::{board_columns, discard_malformed, flatten, partition_owned};
use crate::reconcile::reconcile;
use crate::writer::{BatchPositionWriter, BatchWriteReport};

// ============================================================================
// OUTCOMES
// ============================================================================

/// What a full load found and did.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub lead_count: usize,
    /// Ids dropped because they cannot be used as store keys.
    pub discarded: Vec<LeadId>,
    pub problems: Vec<ProblemReport>,
    /// Leads that were given a position during this load.
    pub backfilled: usize,
    /// Set when positions were assigned locally but could not be stored.
    pub backfill_error: Option<LeadflowError>,
}

/// How the persistence of one drag ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The drag changed nothing; no write was made.
    Noop,
    Committed(BatchWriteReport),
    /// The write failed and local state was replaced from the store.
    Resynced { error: LeadflowError },
    /// The write failed and so did the reload that followed.
    ResyncFailed {
        error: LeadflowError,
        resync_error: LeadflowError,
    },
}

/// Handle on a drag's background write.
#[derive(Debug)]
pub struct PendingSync {
    task: Option<JoinHandle<SyncOutcome>>,
}

impl PendingSync {
    fn noop() -> Self {
        Self { task: None }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the write, and any resync it triggered, to finish.
    pub async fn wait(self) -> LeadflowResult<SyncOutcome> {
        match self.task {
            None => Ok(SyncOutcome::Noop),
            Some(task) => task.await.map_err(|e| {
                LeadflowError::Storage(StorageError::Unavailable {
                    reason: format!("sync task ended abnormally: {e}"),
                })
            }),
        }
    }
}

// ============================================================================
// BOARD
// ============================================================================

struct BoardInner<S: ?Sized> {
    config: BoardConfig,
    store: Arc<S>,
    writer: BatchPositionWriter<S>,
    leads: RwLock<Vec<Lead>>,
    /// Latest drag sequence per lead whose write has not completed.
    pending: Mutex<HashMap<LeadId, u64>>,
    sequence: AtomicU64,
}

/// Local lead collection kept in step with a document store.
///
/// Cloning shares state.
pub struct OptimisticBoard<S: ?Sized> {
    inner: Arc<BoardInner<S>>,
}

impl<S: ?Sized> Clone for OptimisticBoard<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn poisoned<T>(_: T) -> LeadflowError {
    LeadflowError::Storage(StorageError::LockPoisoned)
}

/// Mirror the `lastActivity` a committed batch wrote onto local leads.
fn stamp_last_activity(leads: &mut [Lead], report: &BatchWriteReport) {
    let Some(at) = report.written_at else {
        return;
    };
    let written: HashSet<&LeadId> = report.applied_ids.iter().collect();
    for lead in leads.iter_mut().filter(|l| written.contains(&l.id)) {
        lead.last_activity = Some(at);
    }
}

impl<S> OptimisticBoard<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    /// Create an empty board. Call [`OptimisticBoard::load`] to populate it.
    pub fn new(store: Arc<S>, config: BoardConfig) -> Self {
        let writer = BatchPositionWriter::new(Arc::clone(&store), &config);
        Self {
            inner: Arc::new(BoardInner {
                config,
                store,
                writer,
                leads: RwLock::new(Vec::new()),
                pending: Mutex::new(HashMap::new()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.inner.config
    }

    /// Fetch the whole collection and replace local state with it.
    ///
    /// Malformed ids are dropped. Leads without a position are given one and
    /// the assignment is written back; if that write fails the board still
    /// renders with the locally assigned positions.
    pub async fn load(&self) -> LeadflowResult<LoadReport> {
        self.inner.load().await
    }

    /// Current collection, flattened in column order.
    pub fn snapshot(&self) -> LeadflowResult<Vec<Lead>> {
        Ok(self.inner.leads.read().map_err(poisoned)?.clone())
    }

    /// Current collection as rendered columns, configured columns first.
    pub fn columns(&self) -> LeadflowResult<Vec<(LeadStatus, Vec<Lead>)>> {
        let leads = self.snapshot()?;
        Ok(board_columns(partition_owned(leads), &self.inner.config.columns))
    }

    /// Leads with a write still in flight.
    pub fn pending(&self) -> LeadflowResult<Vec<LeadId>> {
        let pending = self.inner.pending.lock().map_err(poisoned)?;
        let mut ids: Vec<LeadId> = pending.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Apply a drag locally and start persisting it.
    ///
    /// Local state is updated before this returns. Must be called from
    /// within a tokio runtime; without one nothing is applied and an
    /// `Unavailable` error is returned.
    pub fn handle_drag_end(&self, drag: &DragResult) -> LeadflowResult<PendingSync> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            LeadflowError::Storage(StorageError::Unavailable {
                reason: format!("no async runtime: {e}"),
            })
        })?;

        let (updates, status_change, sequence) = {
            let mut leads = self.inner.leads.write().map_err(poisoned)?;
            let result = reconcile(&leads, drag);
            if result.is_noop() {
                return Ok(PendingSync::noop());
            }
            // Pending marker first, then local state.
            let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner
                .pending
                .lock()
                .map_err(poisoned)?
                .insert(drag.moved_id.clone(), sequence);
            *leads = result.leads;
            (result.position_updates, result.status_change, sequence)
        };

        debug!(
            lead_id = %drag.moved_id,
            sequence,
            updates = updates.len(),
            status_changed = status_change.is_some(),
            "optimistic update applied"
        );

        let inner = Arc::clone(&self.inner);
        let moved_id = drag.moved_id.clone();
        let task = runtime.spawn(async move {
            inner.persist(moved_id, sequence, updates, status_change).await
        });
        Ok(PendingSync { task: Some(task) })
    }
}

impl<S> BoardInner<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    async fn load(&self) -> LeadflowResult<LoadReport> {
        let collection = &self.config.collection;
        let docs = self.store.get_all(collection).await?;
        let problems = scan_documents(&docs, &self.config.invalid_id_sentinels);

        let decoded: Vec<Lead> = docs
            .iter()
            .map(|doc| decode_lead(doc, &self.config.default_status))
            .collect();
        let (mut leads, discarded) = discard_malformed(decoded, &self.config.invalid_id_sentinels);

        let mut backfilled = 0;
        let mut backfill_error = None;
        if needs_init(&leads) {
            let updates = backfill(&leads);
            apply_positions(&mut leads, &updates);
            backfilled = updates.len();
            match self.writer.write_batch(&updates).await {
                Ok(report) => {
                    stamp_last_activity(&mut leads, &report);
                    info!(assigned = backfilled, applied = report.applied_count, "positions backfilled");
                }
                Err(e) => {
                    warn!(assigned = backfilled, error = %e, "backfill not stored; rendering local positions");
                    backfill_error = Some(e);
                }
            }
        }

        let leads = flatten(partition_owned(leads));
        let lead_count = leads.len();
        *self.leads.write().map_err(poisoned)? = leads;

        info!(
            collection = %collection,
            leads = lead_count,
            discarded = discarded.len(),
            flagged = problems.len(),
            "board loaded"
        );

        Ok(LoadReport {
            lead_count,
            discarded,
            problems,
            backfilled,
            backfill_error,
        })
    }

    fn clear_pending(&self, id: &LeadId, sequence: u64) {
        match self.pending.lock() {
            Ok(mut pending) => {
                if pending.get(id) == Some(&sequence) {
                    pending.remove(id);
                }
            }
            Err(_) => warn!(lead_id = %id, "pending map poisoned; marker left in place"),
        }
    }

    async fn persist(
        &self,
        moved_id: LeadId,
        sequence: u64,
        updates: Vec<PositionUpdate>,
        status_change: Option<StatusChange>,
    ) -> SyncOutcome {
        match self.writer.write_move(&updates, status_change.as_ref()).await {
            Ok(report) => {
                match self.leads.write() {
                    Ok(mut leads) => stamp_last_activity(&mut leads, &report),
                    Err(_) => warn!(lead_id = %moved_id, "lead state poisoned; activity times not refreshed"),
                }
                self.clear_pending(&moved_id, sequence);
                SyncOutcome::Committed(report)
            }
            Err(error) => {
                warn!(
                    lead_id = %moved_id,
                    sequence,
                    error = %error,
                    delay_ms = self.config.refetch_delay_ms,
                    "write failed; scheduling resync"
                );
                tokio::time::sleep(self.config.refetch_delay()).await;
                let outcome = match self.load().await {
                    Ok(_) => SyncOutcome::Resynced { error },
                    Err(resync_error) => {
                        warn!(error = %resync_error, "resync failed; local state may be stale");
                        SyncOutcome::ResyncFailed {
                            error,
                            resync_error,
                        }
                    }
                };
                self.clear_pending(&moved_id, sequence);
                outcome
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
