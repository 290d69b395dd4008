//! Leadflow Core - Pipeline Data Types
//!
//! Pure data structures shared by the store seam and the ordering engine.
//! This crate contains no I/O.

pub mod board;
pub mod config;
pub mod error;
pub mod identity;
pub mod lead;

pub use board::{DragResult, PositionUpdate, StatusChange};
pub use config::{default_columns, BoardConfig, ColumnDef, WritePolicy};
pub use error::{ConfigError, LeadflowError, LeadflowResult, StorageError, ValidationError};
pub use identity::{
    stage, LeadId, LeadStatus, Position, Timestamp, DEFAULT_INVALID_ID_SENTINELS,
};
pub use lead::{
    Activities, Activity, ActivityKind, Lead, LeadDetails, LeadPatch, NewActivity, NewLead,
};
