//! Error types for leadflow operations

use thiserror::Error;

/// Document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Insert failed in {collection}: {reason}")]
    InsertFailed { collection: String, reason: String },

    #[error("Batch of {size} writes to {collection} rejected: {reason}")]
    BatchFailed {
        collection: String,
        size: usize,
        reason: String,
    },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid lead id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Invalid position {value} for lead {id}")]
    InvalidPosition { id: String, value: String },

    #[error("Column {status} has no free position")]
    ColumnFull { status: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all leadflow errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeadflowError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for leadflow operations.
pub type LeadflowResult<T> = Result<T, LeadflowError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            collection: "leads".to_string(),
            id: "abc".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not found"));
        assert!(msg.contains("leads/abc"));
    }

    #[test]
    fn test_storage_error_display_batch_failed() {
        let err = StorageError::BatchFailed {
            collection: "leads".to_string(),
            size: 3,
            reason: "network".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Batch of 3"));
        assert!(msg.contains("network"));
    }

    #[test]
    fn test_validation_error_display_invalid_position() {
        let err = ValidationError::InvalidPosition {
            id: "abc".to_string(),
            value: "-4".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("-4"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_validation_error_display_column_full() {
        let err = ValidationError::ColumnFull {
            status: "Qualified".to_string(),
        };
        assert!(format!("{}", err).contains("Qualified"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "refetch_delay_ms".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("refetch_delay_ms"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_leadflow_error_from_variants() {
        let storage = LeadflowError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, LeadflowError::Storage(_)));

        let validation = LeadflowError::from(ValidationError::ColumnFull {
            status: "New".to_string(),
        });
        assert!(matches!(validation, LeadflowError::Validation(_)));

        let config = LeadflowError::from(ConfigError::Parse {
            reason: "eof".to_string(),
        });
        assert!(matches!(config, LeadflowError::Config(_)));
    }
}
