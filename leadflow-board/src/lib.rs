//! Leadflow Board - Pipeline Ordering Engine
//!
//! Keeps the leads of a kanban pipeline in a stable per-column order:
//!
//! - [`allocator`]: position for a lead appended to a column
//! - [`partition`]: grouping and ordering leads by status
//! - [`backfill`]: positions for leads stored without one
//! - [`reconcile`]: drag-and-drop to position assignments
//! - [`writer`]: batched, filtered position writes
//! - [`optimistic`]: local state, background persistence, resync on failure
//!
//! [`service`], [`diagnostics`] and [`summary`] cover the lead operations
//! around the board.

pub mod allocator;
pub mod backfill;
pub mod diagnostics;
pub mod optimistic;
pub mod partition;
pub mod reconcile;
pub mod service;
pub mod summary;
pub mod writer;

pub use allocator::{allocate, next_position};
pub use backfill::{apply_positions, backfill, needs_init};
pub use diagnostics::{scan_documents, Problem, ProblemReport};
pub use optimistic::{LoadReport, OptimisticBoard, PendingSync, SyncOutcome};
pub use partition::{
    board_columns, discard_malformed, flatten, partition, partition_owned, sort_column, Columns,
};
pub use reconcile::{column_order, reconcile, Reconciliation};
pub use service::{LeadService, MigrationReport};
pub use summary::{parse_value, summarize, BoardSummary, ColumnSummary};
pub use writer::{BatchPositionWriter, BatchWriteReport, SkipReason, SkippedUpdate};
