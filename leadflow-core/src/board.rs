//! Value types exchanged between the board UI and the ordering engine

use serde::{Deserialize, Serialize};

use crate::{LeadId, LeadStatus, Position};

/// A single `{id, position}` assignment bound for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: LeadId,
    pub position: Position,
}

impl PositionUpdate {
    pub fn new(id: impl Into<LeadId>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}

/// Drag-end event as reported by the board.
///
/// Indices are zero-based and refer to the rendered column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragResult {
    pub moved_id: LeadId,
    pub source_status: LeadStatus,
    pub source_index: usize,
    pub dest_status: LeadStatus,
    pub dest_index: usize,
}

impl DragResult {
    /// A drop back onto the slot the card came from.
    pub fn is_noop(&self) -> bool {
        self.source_status == self.dest_status && self.source_index == self.dest_index
    }

    pub fn crosses_columns(&self) -> bool {
        self.source_status != self.dest_status
    }
}

/// Column transition performed as part of a drag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: LeadId,
    pub from: LeadStatus,
    pub to: LeadStatus,
    /// Position the lead holds in its new column.
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(src: &str, si: usize, dst: &str, di: usize) -> DragResult {
        DragResult {
            moved_id: LeadId::new("x"),
            source_status: src.into(),
            source_index: si,
            dest_status: dst.into(),
            dest_index: di,
        }
    }

    #[test]
    fn test_noop_detection() {
        assert!(drag("New", 2, "New", 2).is_noop());
        assert!(!drag("New", 2, "New", 0).is_noop());
        assert!(!drag("New", 0, "Contacted", 0).is_noop());
    }

    #[test]
    fn test_drag_result_reads_camel_case() {
        let raw = r#"{"movedId":"x","sourceStatus":"New","sourceIndex":1,"destStatus":"Qualified","destIndex":0}"#;
        let parsed: DragResult = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, drag("New", 1, "Qualified", 0));
        assert!(parsed.crosses_columns());
    }
}
