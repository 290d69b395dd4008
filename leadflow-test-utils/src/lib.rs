//! Leadflow Test Utilities
//!
//! Centralized test infrastructure for the leadflow workspace:
//! - Proptest generators for leads, collections and drag events
//! - Test fixtures for common board scenarios
//! - Custom assertions for ordering invariants
//! - Tracing setup for tests

// Re-export the in-memory store from its source crate
pub use leadflow_storage::InMemoryDocumentStore;

// Re-export core types for convenience
pub use leadflow_core::{
    BoardConfig, DragResult, Lead, LeadDetails, LeadId, LeadStatus, LeadflowError, LeadflowResult,
    Position, PositionUpdate, StorageError, Timestamp, ValidationError,
};

use std::collections::HashSet;
use std::sync::Once;

/// Install a test-writer subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("leadflow_board=debug,leadflow_storage=debug,info")
        });
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Render order of one column: position ascending, unpositioned last, stable.
fn column_ids(leads: &[Lead], status: &LeadStatus) -> Vec<LeadId> {
    let mut column: Vec<&Lead> = leads.iter().filter(|l| &l.status == status).collect();
    column.sort_by_key(|l| l.valid_position().unwrap_or(Position::MAX));
    column.into_iter().map(|l| l.id.clone()).collect()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating leadflow types.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    /// Stock pipeline stages.
    pub const STATUSES: [&str; 4] = ["New", "Contacted", "Qualified", "Negotiating"];

    // === Identity Generators ===

    /// Generate a well-formed store key.
    pub fn arb_lead_id() -> impl Strategy<Value = LeadId> {
        "[A-Za-z0-9]{1,20}"
            .prop_map(LeadId::new)
            .prop_filter("placeholder id", LeadId::is_well_formed)
    }

    /// Generate an id that must never reach the store.
    pub fn arb_malformed_id() -> impl Strategy<Value = LeadId> {
        prop_oneof![
            Just(LeadId::new("")),
            Just(LeadId::new("   ")),
            Just(LeadId::new("NaN")),
            Just(LeadId::new("undefined")),
            Just(LeadId::new("null")),
            Just(LeadId::new("-1")),
            "[a-z]{1,4}/[a-z]{1,4}".prop_map(LeadId::new),
        ]
    }

    /// Generate one of the stock statuses.
    pub fn arb_status() -> impl Strategy<Value = LeadStatus> {
        prop::sample::select(STATUSES.to_vec()).prop_map(LeadStatus::new)
    }

    /// Generate a stored position, sometimes absent.
    pub fn arb_position() -> impl Strategy<Value = Option<Position>> {
        prop_oneof![
            3 => (0i64..1000).prop_map(Some),
            1 => Just(None),
        ]
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Lead Generators ===

    /// Generate a single lead with arbitrary ordering fields.
    pub fn arb_lead() -> impl Strategy<Value = Lead> {
        (
            arb_lead_id(),
            arb_status(),
            arb_position(),
            prop::option::of(arb_timestamp()),
        )
            .prop_map(|(id, status, position, last_activity)| {
                let mut lead = Lead::new(id, status);
                lead.position = position;
                lead.last_activity = last_activity;
                lead
            })
    }

    /// Generate a collection with unique ids `lead-0..`, possibly with
    /// missing or colliding positions.
    pub fn arb_collection(max: usize) -> impl Strategy<Value = Vec<Lead>> {
        prop::collection::vec(arb_lead(), 1..max.max(2)).prop_map(|leads| {
            leads
                .into_iter()
                .enumerate()
                .map(|(i, lead)| Lead {
                    id: LeadId::new(format!("lead-{i}")),
                    ..lead
                })
                .collect()
        })
    }

    /// Generate a well-formed collection: every lead positioned, positions
    /// unique within each status and not necessarily contiguous.
    pub fn arb_positioned_collection(max: usize) -> impl Strategy<Value = Vec<Lead>> {
        prop::collection::vec((arb_status(), 1i64..4), 1..max.max(2)).prop_map(|raw| {
            let mut next: std::collections::HashMap<LeadStatus, Position> = Default::default();
            raw.into_iter()
                .enumerate()
                .map(|(i, (status, step))| {
                    let slot = next.entry(status.clone()).or_insert(0);
                    *slot += step;
                    Lead::new(format!("lead-{i}"), status).with_position(*slot)
                })
                .collect()
        })
    }

    /// Generate a drag of some lead in `leads` to any column and index.
    ///
    /// `leads` must not be empty. The source index is the lead's rendered
    /// slot in its own column.
    pub fn arb_drag(leads: Vec<Lead>) -> impl Strategy<Value = DragResult> {
        let len = leads.len();
        (0..len, arb_status(), 0..len + 2).prop_map(move |(pick, dest_status, dest_index)| {
            let lead = &leads[pick];
            let source_index = column_ids(&leads, &lead.status)
                .iter()
                .position(|id| *id == lead.id)
                .unwrap_or(0);
            DragResult {
                moved_id: lead.id.clone(),
                source_status: lead.status.clone(),
                source_index,
                dest_status,
                dest_index,
            }
        })
    }

    /// Generate a collection together with a sequence of drags over it.
    ///
    /// Drags pick leads by index so they stay meaningful after earlier drags
    /// have moved things around.
    pub fn arb_drag_sequence(
        max_leads: usize,
        max_drags: usize,
    ) -> impl Strategy<Value = (Vec<Lead>, Vec<(usize, LeadStatus, usize)>)> {
        arb_positioned_collection(max_leads).prop_flat_map(move |leads| {
            let len = leads.len();
            let drags = prop::collection::vec((0..len, arb_status(), 0..len + 2), 0..max_drags.max(1));
            (Just(leads), drags)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common board scenarios.

    use super::*;
    use leadflow_storage::Fields;
    use serde_json::{json, Value};

    pub const COLLECTION: &str = "leads";

    /// Two leads in New, one in Contacted, all positioned from 1.
    pub fn scenario_leads() -> Vec<Lead> {
        vec![
            Lead::new("1", "New").with_position(1),
            Lead::new("2", "New").with_position(2),
            Lead::new("3", "Contacted").with_position(1),
        ]
    }

    /// A small pipeline with business fields filled in.
    pub fn sample_pipeline() -> Vec<Lead> {
        let rows = [
            ("jd-1", "John", "Doe", "Tech Corp", "$5,000", "New", 1),
            ("sj-2", "Sarah", "Johnson", "Marketing Pro", "$12,000", "New", 2),
            ("mb-3", "Michael", "Brown", "Sales Solutions", "$8,500", "Contacted", 1),
            ("ed-4", "Emily", "Davis", "Design Studio", "$15,000", "Qualified", 1),
            ("rw-5", "Robert", "Wilson", "Wilson Logistics", "$22,000", "Negotiating", 4),
        ];
        rows.into_iter()
            .map(|(id, first, last, company, value, status, position)| {
                Lead::new(id, status)
                    .with_position(position)
                    .with_details(LeadDetails {
                        first_name: first.to_string(),
                        last_name: last.to_string(),
                        company: company.to_string(),
                        value: Some(value.to_string()),
                        ..LeadDetails::default()
                    })
            })
            .collect()
    }

    /// Stored fields for a lead's ordering data.
    pub fn lead_document(lead: &Lead) -> Fields {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(lead.status));
        if let Some(position) = lead.position {
            fields.insert("position".to_string(), json!(position));
        }
        if let Some(at) = lead.last_activity {
            fields.insert("lastActivity".to_string(), Value::String(at.to_rfc3339()));
        }
        if !lead.details.first_name.is_empty() {
            fields.insert("firstName".to_string(), json!(lead.details.first_name));
        }
        if let Some(value) = &lead.details.value {
            fields.insert("value".to_string(), json!(value));
        }
        fields
    }

    /// An in-memory store holding `leads` under their own ids.
    pub fn seeded_store(leads: &[Lead]) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for lead in leads {
            store
                .seed(COLLECTION, lead.id.as_str(), lead_document(lead))
                .expect("seed in-memory store");
        }
        store
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for leadflow-specific invariants.

    use super::*;

    /// Assert that no two leads in the same status share a position.
    pub fn assert_unique_positions(leads: &[Lead]) {
        let mut seen = HashSet::new();
        for lead in leads {
            if let Some(position) = lead.position {
                assert!(
                    seen.insert((lead.status.clone(), position)),
                    "duplicate position {} in column {}",
                    position,
                    lead.status
                );
            }
        }
    }

    /// Assert that `status` renders as exactly `expected`.
    pub fn assert_column(leads: &[Lead], status: &str, expected: &[&str]) {
        let ids = column_ids(leads, &LeadStatus::new(status));
        let ids: Vec<&str> = ids.iter().map(LeadId::as_str).collect();
        assert_eq!(ids, expected, "column {status} order");
    }

    /// Assert that a result is a validation error.
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &LeadflowResult<T>) {
        match result {
            Err(LeadflowError::Validation(_)) => {}
            _ => panic!("Expected ValidationError, got: {:?}", result),
        }
    }

    /// Assert that a result is a storage NotFound error.
    pub fn assert_not_found<T: std::fmt::Debug>(result: &LeadflowResult<T>) {
        match result {
            Err(LeadflowError::Storage(StorageError::NotFound { .. })) => {}
            _ => panic!("Expected NotFound, got: {:?}", result),
        }
    }
}
