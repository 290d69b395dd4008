//! Lazy position backfill for collections that predate ordering.

use std::cmp::Reverse;
use std::collections::HashMap;

use leadflow_core::{Lead, LeadId, LeadStatus, Position, PositionUpdate};
use tracing::warn;

use crate::allocator::allocate;

/// True when any lead lacks a usable position.
pub fn needs_init(leads: &[Lead]) -> bool {
    leads.iter().any(|lead| !lead.has_valid_position())
}

/// Positions for every unpositioned lead, grouped by status.
///
/// Within a group the unpositioned leads are ordered most recently active
/// first (leads with no activity timestamp last, input order otherwise) and
/// numbered upward from one past the group's largest existing position.
/// Positioned leads are never touched. Leads that would need a slot past
/// `Position::MAX` are left unpositioned.
pub fn backfill(leads: &[Lead]) -> Vec<PositionUpdate> {
    let mut groups: Vec<(&LeadStatus, Vec<&Lead>)> = Vec::new();
    let mut index: HashMap<&LeadStatus, usize> = HashMap::new();
    for lead in leads {
        let slot = *index.entry(&lead.status).or_insert_with(|| {
            groups.push((&lead.status, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(lead);
    }

    let mut updates = Vec::new();
    for (status, members) in groups {
        let mut next = allocate(members.iter().map(|l| l.position));
        let mut pending: Vec<&Lead> = members
            .into_iter()
            .filter(|l| !l.has_valid_position())
            .collect();
        pending.sort_by_key(|l| Reverse(l.last_activity));
        for lead in pending {
            let Some(position) = next else {
                warn!(lead_id = %lead.id, status = %status, "column has no free position; leaving lead unpositioned");
                continue;
            };
            updates.push(PositionUpdate::new(lead.id.clone(), position));
            next = position.checked_add(1);
        }
    }
    updates
}

/// Apply position assignments to a local collection.
pub fn apply_positions(leads: &mut [Lead], updates: &[PositionUpdate]) {
    let assigned: HashMap<&LeadId, Position> =
        updates.iter().map(|u| (&u.id, u.position)).collect();
    for lead in leads.iter_mut() {
        if let Some(position) = assigned.get(&lead.id) {
            lead.position = Some(*position);
        }
    }
}
