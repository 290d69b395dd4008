//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::{ConfigError, LeadStatus, LeadflowError, LeadflowResult, DEFAULT_INVALID_ID_SENTINELS};

/// How the batch writer treats targets that may have been deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Look every target up first and drop the ones that are gone.
    #[default]
    VerifyExisting,
    /// Merge-write without a lookup; a missing target is recreated as a stub.
    Upsert,
}

impl WritePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "verify_existing" | "verify" => Some(WritePolicy::VerifyExisting),
            "upsert" => Some(WritePolicy::Upsert),
            _ => None,
        }
    }
}

/// One rendered column of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub id: LeadStatus,
    pub title: String,
}

impl ColumnDef {
    pub fn new(id: impl Into<LeadStatus>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Stock pipeline columns, in render order.
pub fn default_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new(LeadStatus::new_lead(), "New Leads"),
        ColumnDef::new(LeadStatus::contacted(), "Contacted"),
        ColumnDef::new(LeadStatus::qualified(), "Qualified"),
        ColumnDef::new(LeadStatus::negotiating(), "Negotiating"),
    ]
}

/// Board configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    /// Store collection holding lead documents.
    pub collection: String,
    pub columns: Vec<ColumnDef>,
    /// Status given to leads created without one, and to stored leads
    /// whose status is missing.
    pub default_status: LeadStatus,
    /// Delay before the resync that follows a failed write.
    pub refetch_delay_ms: u64,
    pub write_policy: WritePolicy,
    /// Identifier strings treated as placeholders, never as real keys.
    pub invalid_id_sentinels: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            collection: "leads".to_string(),
            columns: default_columns(),
            default_status: LeadStatus::new_lead(),
            refetch_delay_ms: 1000,
            write_policy: WritePolicy::VerifyExisting,
            invalid_id_sentinels: DEFAULT_INVALID_ID_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl BoardConfig {
    pub fn refetch_delay(&self) -> Duration {
        Duration::from_millis(self.refetch_delay_ms)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `LEADFLOW_COLLECTION`: lead collection name (default: leads)
    /// - `LEADFLOW_DEFAULT_STATUS`: status for new leads (default: New)
    /// - `LEADFLOW_REFETCH_DELAY_MS`: resync delay after a failed write (default: 1000)
    /// - `LEADFLOW_WRITE_POLICY`: `verify_existing` or `upsert` (default: verify_existing)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BoardConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            collection: lookup("LEADFLOW_COLLECTION")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.collection),
            default_status: lookup("LEADFLOW_DEFAULT_STATUS")
                .filter(|s| !s.trim().is_empty())
                .map(LeadStatus::new)
                .unwrap_or(defaults.default_status),
            refetch_delay_ms: lookup("LEADFLOW_REFETCH_DELAY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.refetch_delay_ms),
            write_policy: lookup("LEADFLOW_WRITE_POLICY")
                .and_then(|s| WritePolicy::parse(&s))
                .unwrap_or(defaults.write_policy),
            ..defaults
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> LeadflowResult<Self> {
        let config: BoardConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - collection is not blank
    /// - at least one column, no duplicate column ids
    /// - default_status names one of the columns
    /// - refetch_delay_ms > 0
    pub fn validate(&self) -> LeadflowResult<()> {
        if self.collection.trim().is_empty() {
            return Err(invalid("collection", &self.collection, "must not be empty"));
        }

        if self.columns.is_empty() {
            return Err(LeadflowError::Config(ConfigError::MissingRequired {
                field: "columns".to_string(),
            }));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.id.as_str().trim().is_empty() {
                return Err(invalid("columns.id", column.id.as_str(), "must not be empty"));
            }
            if !seen.insert(&column.id) {
                return Err(invalid("columns.id", column.id.as_str(), "duplicate column"));
            }
        }

        if !seen.contains(&self.default_status) {
            return Err(invalid(
                "default_status",
                self.default_status.as_str(),
                "must name one of the configured columns",
            ));
        }

        if self.refetch_delay_ms == 0 {
            return Err(invalid("refetch_delay_ms", "0", "must be positive"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> LeadflowError {
    LeadflowError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = BoardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refetch_delay(), Duration::from_secs(1));
        assert_eq!(config.columns.len(), 4);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LEADFLOW_COLLECTION", "prospects"),
            ("LEADFLOW_REFETCH_DELAY_MS", "250"),
            ("LEADFLOW_WRITE_POLICY", "upsert"),
        ]
        .into_iter()
        .collect();
        let config = BoardConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.collection, "prospects");
        assert_eq!(config.refetch_delay_ms, 250);
        assert_eq!(config.write_policy, WritePolicy::Upsert);
        assert_eq!(config.default_status, LeadStatus::new_lead());
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = BoardConfig::from_lookup(|k| match k {
            "LEADFLOW_REFETCH_DELAY_MS" => Some("soon".to_string()),
            "LEADFLOW_WRITE_POLICY" => Some("yolo".to_string()),
            _ => None,
        });
        assert_eq!(config, BoardConfig::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = BoardConfig::from_toml_str(
            r#"
            collection = "crm_leads"
            refetch_delay_ms = 500
            write_policy = "upsert"
            "#,
        )
        .unwrap();
        assert_eq!(config.collection, "crm_leads");
        assert_eq!(config.write_policy, WritePolicy::Upsert);
        assert_eq!(config.columns, default_columns());
    }

    #[test]
    fn test_from_toml_custom_columns() {
        let config = BoardConfig::from_toml_str(
            r#"
            default_status = "Inbox"

            [[columns]]
            id = "Inbox"
            title = "Inbox"

            [[columns]]
            id = "Won"
            title = "Closed Won"
            "#,
        )
        .unwrap();
        assert_eq!(config.columns.len(), 2);
        assert_eq!(config.default_status, LeadStatus::new("Inbox"));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = BoardConfig::from_toml_str("colection = \"typo\"");
        assert!(matches!(
            result,
            Err(LeadflowError::Config(ConfigError::Parse { .. }))
        ));
    }

    #[test]
    fn test_validation_rejects_duplicate_columns() {
        let config = BoardConfig {
            columns: vec![ColumnDef::new("New", "a"), ColumnDef::new("New", "b")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeadflowError::Config(ConfigError::InvalidValue { field, .. })) if field == "columns.id"
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_default_status() {
        let config = BoardConfig {
            default_status: LeadStatus::new("Archived"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeadflowError::Config(ConfigError::InvalidValue { field, .. })) if field == "default_status"
        ));
    }

    #[test]
    fn test_validation_rejects_zero_delay() {
        let config = BoardConfig {
            refetch_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_columns() {
        let config = BoardConfig {
            columns: vec![],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeadflowError::Config(ConfigError::MissingRequired { .. }))
        ));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
