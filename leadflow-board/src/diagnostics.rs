//! Scan of stored lead documents for records the engine will have to work
//! around.
//!
//! The scan is informational. Loading never depends on it; it exists so that
//! corrupt records show up in logs by shape rather than by hand-picked id.

use leadflow_core::LeadId;
use leadflow_storage::{fields, position_value, timestamp_value, RawDocument};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// The document key is not usable as a lead id.
    MalformedId { reason: String },
    /// No `status`, or an empty one.
    MissingStatus,
    /// `status` is present but not a string.
    InvalidStatus,
    /// A timestamp field is present but unreadable.
    InvalidTimestamp { field: &'static str },
    /// `position` is present but not a non-negative integer.
    InvalidPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemReport {
    pub id: String,
    pub problems: Vec<Problem>,
}

fn check(doc: &RawDocument, sentinels: &[impl AsRef<str>]) -> Vec<Problem> {
    let mut problems = Vec::new();

    if let Err(leadflow_core::ValidationError::InvalidId { reason, .. }) =
        LeadId::new(doc.id.clone()).validate_against(sentinels)
    {
        problems.push(Problem::MalformedId { reason });
    }

    match doc.get(fields::STATUS) {
        None | Some(Value::Null) => problems.push(Problem::MissingStatus),
        Some(Value::String(s)) if s.trim().is_empty() => problems.push(Problem::MissingStatus),
        Some(Value::String(_)) => {}
        Some(_) => problems.push(Problem::InvalidStatus),
    }

    for field in [fields::CREATED_AT, fields::LAST_ACTIVITY] {
        if let Some(value) = doc.get(field) {
            if timestamp_value(value).is_none() {
                problems.push(Problem::InvalidTimestamp { field });
            }
        }
    }

    if let Some(value) = doc.get(fields::POSITION) {
        if position_value(value).is_none() {
            problems.push(Problem::InvalidPosition);
        }
    }

    problems
}

/// Reports for every document with at least one problem, in input order.
pub fn scan_documents<S: AsRef<str>>(docs: &[RawDocument], sentinels: &[S]) -> Vec<ProblemReport> {
    let reports: Vec<ProblemReport> = docs
        .iter()
        .filter_map(|doc| {
            let problems = check(doc, sentinels);
            if problems.is_empty() {
                return None;
            }
            warn!(lead_id = %doc.id, ?problems, "problematic lead document");
            Some(ProblemReport {
                id: doc.id.clone(),
                problems,
            })
        })
        .collect();

    if !reports.is_empty() {
        info!(scanned = docs.len(), flagged = reports.len(), "lead document scan finished");
    }
    reports
}
