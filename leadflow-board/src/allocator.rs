//! Position allocation for records appended to a column.

use leadflow_core::{Lead, LeadStatus, Position};

/// Next position at the bottom of a column: one past the largest usable
/// position, or `1` for a column with none.
///
/// Missing and negative entries are ignored rather than read as zero.
/// Returns `None` when a lead already sits at `Position::MAX`, since there is
/// no free slot below it.
pub fn allocate<I>(existing: I) -> Option<Position>
where
    I: IntoIterator<Item = Option<Position>>,
{
    existing
        .into_iter()
        .flatten()
        .filter(|p| *p >= 0)
        .max()
        .map_or(Some(1), |max| max.checked_add(1))
}

/// [`allocate`] over the members of `status` in a loaded collection.
pub fn next_position(leads: &[Lead], status: &LeadStatus) -> Option<Position> {
    allocate(
        leads
            .iter()
            .filter(|lead| &lead.status == status)
            .map(|lead| lead.position),
    )
}
