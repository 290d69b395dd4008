//! Grouping a flat lead collection into ordered columns.

use std::collections::{BTreeMap, HashSet};

use leadflow_core::{ColumnDef, Lead, LeadId, LeadStatus, Position};
use tracing::warn;

/// Leads grouped by status, each group in render order.
pub type Columns = BTreeMap<LeadStatus, Vec<Lead>>;

/// Sort key used for leads without a usable position.
const UNPOSITIONED: Position = Position::MAX;

fn sort_key(lead: &Lead) -> Position {
    lead.valid_position().unwrap_or(UNPOSITIONED)
}

/// Sort one column in place: position ascending, unpositioned last.
///
/// The sort is stable, so equal positions keep their input order.
pub fn sort_column(column: &mut [Lead]) {
    column.sort_by_key(sort_key);
}

/// Group leads by status and order each group.
///
/// Every lead is kept. Callers that want malformed records removed run
/// [`discard_malformed`] first.
pub fn partition(leads: &[Lead]) -> Columns {
    partition_owned(leads.to_vec())
}

/// [`partition`] without cloning.
pub fn partition_owned(leads: Vec<Lead>) -> Columns {
    let mut columns = Columns::new();
    for lead in leads {
        columns.entry(lead.status.clone()).or_default().push(lead);
    }
    for column in columns.values_mut() {
        sort_column(column);
    }
    columns
}

/// Concatenate columns back into a flat list, in status order.
pub fn flatten(columns: Columns) -> Vec<Lead> {
    columns.into_values().flatten().collect()
}

/// Drop leads whose id cannot be used as a store key.
///
/// Returns the kept leads and the ids that were dropped.
pub fn discard_malformed<S: AsRef<str>>(leads: Vec<Lead>, sentinels: &[S]) -> (Vec<Lead>, Vec<LeadId>) {
    let mut kept = Vec::with_capacity(leads.len());
    let mut dropped = Vec::new();
    for lead in leads {
        match lead.id.validate_against(sentinels) {
            Ok(()) => kept.push(lead),
            Err(e) => {
                warn!(lead_id = %lead.id, error = %e, "discarding lead with malformed id");
                dropped.push(lead.id);
            }
        }
    }
    (kept, dropped)
}

/// Columns in configured order, followed by any statuses present in the
/// data that the configuration does not name.
///
/// Configured columns with no leads are included empty.
pub fn board_columns(mut columns: Columns, defs: &[ColumnDef]) -> Vec<(LeadStatus, Vec<Lead>)> {
    let mut out = Vec::with_capacity(defs.len() + columns.len());
    let mut named = HashSet::new();
    for def in defs {
        if !named.insert(def.id.clone()) {
            continue;
        }
        let leads = columns.remove(&def.id).unwrap_or_default();
        out.push((def.id.clone(), leads));
    }
    out.extend(columns);
    out
}
