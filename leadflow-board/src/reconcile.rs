//! Drag reconciliation: from a drop event to new positions.
//!
//! Every move renumbers the destination column `1..N`. The source column is
//! left alone when a card leaves it; the gap is harmless because ordering
//! only ever compares positions.

use leadflow_core::{DragResult, Lead, LeadStatus, Position, PositionUpdate, StatusChange};
use tracing::{debug, warn};

use crate::partition::sort_column;

/// Result of applying a drag to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The full collection with the move applied, in input order.
    pub leads: Vec<Lead>,
    /// Destination assignments that differ from what was there before, in
    /// destination order. The moved lead is always included when it
    /// changed column.
    pub position_updates: Vec<PositionUpdate>,
    pub status_change: Option<StatusChange>,
}

impl Reconciliation {
    fn unchanged(leads: &[Lead]) -> Self {
        Self {
            leads: leads.to_vec(),
            position_updates: Vec::new(),
            status_change: None,
        }
    }

    /// Nothing to persist.
    pub fn is_noop(&self) -> bool {
        self.position_updates.is_empty() && self.status_change.is_none()
    }
}

/// Apply `drag` to `leads`.
///
/// A drop onto the original slot, or a drag of a lead that is no longer in
/// the collection, returns the input unchanged. If the moved id appears more
/// than once, the first occurrence is moved and the rest are left where
/// they are.
pub fn reconcile(leads: &[Lead], drag: &DragResult) -> Reconciliation {
    if drag.is_noop() {
        return Reconciliation::unchanged(leads);
    }

    let mut matches = leads
        .iter()
        .enumerate()
        .filter(|(_, lead)| lead.id == drag.moved_id)
        .map(|(i, _)| i);
    let Some(moved_at) = matches.next() else {
        debug!(lead_id = %drag.moved_id, "drag references unknown lead; ignoring");
        return Reconciliation::unchanged(leads);
    };
    let duplicates = matches.count();
    if duplicates > 0 {
        warn!(
            lead_id = %drag.moved_id,
            duplicates,
            "moved id occurs more than once; using first occurrence"
        );
    }

    let moved = &leads[moved_at];
    let from: LeadStatus = moved.status.clone();
    if from != drag.source_status {
        warn!(
            lead_id = %moved.id,
            reported = %drag.source_status,
            actual = %from,
            "drag source column disagrees with lead status"
        );
    }

    // Destination column as rendered, without any copy of the moved lead.
    let mut column: Vec<(usize, &Lead)> = leads
        .iter()
        .enumerate()
        .filter(|(_, lead)| lead.status == drag.dest_status && lead.id != drag.moved_id)
        .collect();
    column.sort_by_key(|(_, lead)| lead.valid_position().unwrap_or(Position::MAX));

    let insert_at = drag.dest_index.min(column.len());
    column.insert(insert_at, (moved_at, moved));

    let status_changed = from != drag.dest_status;
    let mut updated = leads.to_vec();
    let mut position_updates = Vec::new();
    let mut moved_position = 1;

    for (slot, (index, lead)) in column.iter().enumerate() {
        let position = slot as Position + 1;
        let is_moved = *index == moved_at;
        if lead.position != Some(position) || (is_moved && status_changed) {
            position_updates.push(PositionUpdate::new(lead.id.clone(), position));
        }
        updated[*index].position = Some(position);
        if is_moved {
            moved_position = position;
        }
    }

    let status_change = status_changed.then(|| {
        updated[moved_at].status = drag.dest_status.clone();
        StatusChange {
            id: drag.moved_id.clone(),
            from,
            to: drag.dest_status.clone(),
            position: moved_position,
        }
    });

    debug!(
        lead_id = %drag.moved_id,
        status = %drag.dest_status,
        position = moved_position,
        changed = position_updates.len(),
        "drag reconciled"
    );

    Reconciliation {
        leads: updated,
        position_updates,
        status_change,
    }
}

/// One column in render order, as drag indices refer to it.
pub fn column_order(leads: &[Lead], status: &LeadStatus) -> Vec<Lead> {
    let mut column: Vec<Lead> = leads
        .iter()
        .filter(|lead| &lead.status == status)
        .cloned()
        .collect();
    sort_column(&mut column);
    column
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use leadflow_core::LeadId;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const STATUSES: [&str; 3] = ["New", "Contacted", "Qualified"];

    fn collection() -> impl Strategy<Value = Vec<Lead>> {
        prop::collection::vec((prop::sample::select(STATUSES.to_vec()), prop::option::of(0i64..6)), 1..20)
            .prop_map(|raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, (status, position))| {
                        let mut lead = Lead::new(format!("id-{i}"), status);
                        lead.position = position;
                        lead
                    })
                    .collect()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_noop_drag_changes_nothing(leads in collection(), pick in any::<prop::sample::Index>()) {
            let lead = &leads[pick.index(leads.len())];
            let index = column_order(&leads, &lead.status)
                .iter()
                .position(|l| l.id == lead.id)
                .unwrap();
            let drag = DragResult {
                moved_id: lead.id.clone(),
                source_status: lead.status.clone(),
                source_index: index,
                dest_status: lead.status.clone(),
                dest_index: index,
            };
            let result = reconcile(&leads, &drag);
            prop_assert_eq!(result.leads, leads);
            prop_assert!(result.position_updates.is_empty());
        }

        #[test]
        fn prop_destination_is_one_to_n(
            leads in collection(),
            pick in any::<prop::sample::Index>(),
            dest in prop::sample::select(STATUSES.to_vec()),
            dest_index in 0usize..25,
        ) {
            let lead = leads[pick.index(leads.len())].clone();
            let drag = DragResult {
                moved_id: lead.id.clone(),
                source_status: lead.status.clone(),
                source_index: 0,
                dest_status: LeadStatus::new(dest),
                dest_index,
            };
            prop_assume!(!drag.is_noop());
            let result = reconcile(&leads, &drag);

            let column = column_order(&result.leads, &drag.dest_status);
            let positions: Vec<Position> = column.iter().filter_map(|l| l.position).collect();
            let expected: Vec<Position> = (1..=column.len() as Position).collect();
            prop_assert_eq!(positions, expected);

            let moved = result.leads.iter().find(|l| l.id == lead.id).unwrap();
            prop_assert_eq!(&moved.status, &drag.dest_status);

            // Every reported update matches the resulting state.
            let ids: HashSet<&LeadId> = result.position_updates.iter().map(|u| &u.id).collect();
            prop_assert_eq!(ids.len(), result.position_updates.len());
            for update in &result.position_updates {
                let now = result.leads.iter().find(|l| l.id == update.id).unwrap();
                prop_assert_eq!(now.position, Some(update.position));
            }

            // Leads outside the destination are untouched.
            for (before, after) in leads.iter().zip(&result.leads) {
                if before.id != lead.id && before.status != drag.dest_status {
                    prop_assert_eq!(before, after);
                }
            }
        }
    }
}
