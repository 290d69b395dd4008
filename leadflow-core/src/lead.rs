//! Lead records and their activity log

use serde::{Deserialize, Serialize};

use crate::{LeadId, LeadStatus, Position, Timestamp};

// ============================================================================
// ACTIVITIES
// ============================================================================

/// Kind of logged interaction with a prospect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Call,
    Note,
    Email,
    Meeting,
    Document,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::Call,
        ActivityKind::Note,
        ActivityKind::Email,
        ActivityKind::Meeting,
        ActivityKind::Document,
    ];

    /// Key of the list this kind is stored under inside `activities`.
    pub fn list_key(&self) -> &'static str {
        match self {
            ActivityKind::Call => "calls",
            ActivityKind::Note => "notes",
            ActivityKind::Email => "emails",
            ActivityKind::Meeting => "meetings",
            ActivityKind::Document => "documents",
        }
    }
}

/// A single logged interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

/// Caller-supplied part of an activity; id and date are assigned on append.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewActivity {
    pub title: String,
    pub description: String,
    pub status: Option<String>,
    pub duration: Option<String>,
    pub attachments: Vec<String>,
}

/// Per-kind activity lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Activities {
    #[serde(default)]
    pub calls: Vec<Activity>,
    #[serde(default)]
    pub notes: Vec<Activity>,
    #[serde(default)]
    pub emails: Vec<Activity>,
    #[serde(default)]
    pub meetings: Vec<Activity>,
    #[serde(default)]
    pub documents: Vec<Activity>,
}

impl Activities {
    pub fn of(&self, kind: ActivityKind) -> &[Activity] {
        match kind {
            ActivityKind::Call => &self.calls,
            ActivityKind::Note => &self.notes,
            ActivityKind::Email => &self.emails,
            ActivityKind::Meeting => &self.meetings,
            ActivityKind::Document => &self.documents,
        }
    }

    fn of_mut(&mut self, kind: ActivityKind) -> &mut Vec<Activity> {
        match kind {
            ActivityKind::Call => &mut self.calls,
            ActivityKind::Note => &mut self.notes,
            ActivityKind::Email => &mut self.emails,
            ActivityKind::Meeting => &mut self.meetings,
            ActivityKind::Document => &mut self.documents,
        }
    }

    /// Append to the list matching the activity's own kind.
    pub fn push(&mut self, activity: Activity) {
        self.of_mut(activity.kind).push(activity);
    }

    pub fn len(&self) -> usize {
        ActivityKind::ALL.iter().map(|k| self.of(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest activity id across every list, used to mint the next one.
    pub fn max_id(&self) -> Option<i64> {
        ActivityKind::ALL
            .iter()
            .flat_map(|k| self.of(*k).iter().map(|a| a.id))
            .max()
    }
}

// ============================================================================
// LEAD
// ============================================================================

/// Business fields of a lead. The ordering engine never reads these.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LeadDetails {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    /// Deal value as entered, e.g. `"$5,000"`.
    pub value: Option<String>,
    pub tags: Vec<String>,
    pub activities: Activities,
    /// Stored fields this crate has no typed slot for, kept as-is.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A sales prospect tracked through pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    pub id: LeadId,
    pub status: LeadStatus,
    /// `None` when the stored value was missing or unusable.
    pub position: Option<Position>,
    pub last_activity: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    /// Human-facing sequence number, distinct from the store key.
    pub numeric_id: Option<i64>,
    pub details: LeadDetails,
}

impl Lead {
    pub fn new(id: impl Into<LeadId>, status: impl Into<LeadStatus>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            position: None,
            last_activity: None,
            created_at: None,
            numeric_id: None,
            details: LeadDetails::default(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_last_activity(mut self, at: Timestamp) -> Self {
        self.last_activity = Some(at);
        self
    }

    pub fn with_details(mut self, details: LeadDetails) -> Self {
        self.details = details;
        self
    }

    /// Position if it is usable for ordering (present and non-negative).
    pub fn valid_position(&self) -> Option<Position> {
        self.position.filter(|p| *p >= 0)
    }

    pub fn has_valid_position(&self) -> bool {
        self.valid_position().is_some()
    }

    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.details.first_name, self.details.last_name);
        name.trim().to_string()
    }
}

/// Input for creating a lead. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewLead {
    /// Falls back to the board's default status.
    pub status: Option<LeadStatus>,
    /// Explicit position; allocated at the end of the column when absent.
    pub position: Option<Position>,
    pub details: LeadDetails,
}

/// Partial update of a lead. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LeadPatch {
    pub status: Option<LeadStatus>,
    pub position: Option<Position>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
