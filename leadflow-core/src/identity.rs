//! Identity types for pipeline records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValidationError;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Ordinal rank of a lead inside its status column. Lower renders first.
pub type Position = i64;

/// Identifiers that old clients wrote in place of a real document key.
pub const DEFAULT_INVALID_ID_SENTINELS: [&str; 4] = ["NaN", "undefined", "null", "-1"];

/// Store-assigned lead identifier.
///
/// The store hands these out on insert and never reuses them. A `LeadId` can
/// still carry garbage when it was read from a corrupt record or produced by a
/// client bug, so anything that writes to the store checks it first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the id against the default placeholder list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_against(&DEFAULT_INVALID_ID_SENTINELS)
    }

    /// Check the id against a caller-supplied placeholder list.
    pub fn validate_against<S: AsRef<str>>(&self, sentinels: &[S]) -> Result<(), ValidationError> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidId {
                id: self.0.clone(),
                reason: "empty identifier".to_string(),
            });
        }
        if sentinels.iter().any(|s| s.as_ref() == trimmed) {
            return Err(ValidationError::InvalidId {
                id: self.0.clone(),
                reason: "placeholder identifier".to_string(),
            });
        }
        if self.0.contains('/') {
            return Err(ValidationError::InvalidId {
                id: self.0.clone(),
                reason: "contains path separator".to_string(),
            });
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LeadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pipeline stage names used by the stock board.
pub mod stage {
    pub const NEW: &str = "New";
    pub const CONTACTED: &str = "Contacted";
    pub const QUALIFIED: &str = "Qualified";
    pub const NEGOTIATING: &str = "Negotiating";
}

/// Name of the pipeline column a lead sits in.
///
/// The set is open: boards may define their own stages, so this is a string
/// newtype rather than an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadStatus(String);

impl LeadStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn new_lead() -> Self {
        Self::new(stage::NEW)
    }

    pub fn contacted() -> Self {
        Self::new(stage::CONTACTED)
    }

    pub fn qualified() -> Self {
        Self::new(stage::QUALIFIED)
    }

    pub fn negotiating() -> Self {
        Self::new(stage::NEGOTIATING)
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::new_lead()
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeadStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LeadStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}
