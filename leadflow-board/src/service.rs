//! Lead CRUD, activity logging, seeding and data migrations on top of a
//! [`DocumentStore`].

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use leadflow_core::{
    Activity, ActivityKind, BoardConfig, Lead, LeadId, LeadPatch, LeadStatus, LeadflowResult,
    NewActivity, NewLead, Position, StorageError, ValidationError,
};
use leadflow_storage::{
    decode_lead, encode_activities, encode_new_lead, encode_numeric_id, encode_patch, fields,
    numeric_id_value, DocumentStore, DocumentWrite, RawDocument,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::allocator::{allocate, next_position};
use crate::partition::{discard_malformed, flatten, partition_owned};

/// What a migration run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
    /// Leads that were given a `numericId`.
    pub numeric_ids: usize,
}

/// Lead operations for one collection.
pub struct LeadService<S: ?Sized> {
    store: Arc<S>,
    config: BoardConfig,
}

impl<S: ?Sized> Clone for LeadService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S> LeadService<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: BoardConfig) -> Self {
        Self { store, config }
    }

    fn collection(&self) -> &str {
        &self.config.collection
    }

    fn check_id(&self, id: &LeadId) -> LeadflowResult<()> {
        id.validate_against(&self.config.invalid_id_sentinels)?;
        Ok(())
    }

    fn check_position(id: &LeadId, position: Position) -> LeadflowResult<()> {
        if position < 0 {
            return Err(ValidationError::InvalidPosition {
                id: id.to_string(),
                value: position.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_status(status: &LeadStatus) -> LeadflowResult<()> {
        if status.as_str().trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: fields::STATUS.to_string(),
                reason: "status must not be blank".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn column_full(status: &LeadStatus) -> ValidationError {
        ValidationError::ColumnFull {
            status: status.to_string(),
        }
    }

    fn not_found(&self, id: &LeadId) -> StorageError {
        StorageError::NotFound {
            collection: self.collection().to_string(),
            id: id.to_string(),
        }
    }

    fn decode_all(&self, docs: &[RawDocument]) -> Vec<Lead> {
        docs.iter()
            .map(|d| decode_lead(d, &self.config.default_status))
            .collect()
    }

    /// Next free position at the bottom of `status`.
    async fn end_of_column(&self, status: &LeadStatus) -> LeadflowResult<Position> {
        let docs = self
            .store
            .query_eq(self.collection(), fields::STATUS, &json!(status))
            .await?;
        next_position(&self.decode_all(&docs), status)
            .ok_or_else(|| Self::column_full(status).into())
    }

    /// Create a lead and return its store-assigned id.
    ///
    /// Without an explicit position the lead goes to the bottom of its
    /// column.
    pub async fn create_lead(&self, new_lead: NewLead) -> LeadflowResult<LeadId> {
        let status = new_lead
            .status
            .clone()
            .unwrap_or_else(|| self.config.default_status.clone());
        Self::check_status(&status)?;
        let position = match new_lead.position {
            Some(p) if p < 0 => {
                return Err(ValidationError::InvalidPosition {
                    id: String::new(),
                    value: p.to_string(),
                }
                .into())
            }
            Some(p) => p,
            None => self.end_of_column(&status).await?,
        };

        let now = Utc::now();
        let numeric_id = now.timestamp_millis();
        let fields = encode_new_lead(&new_lead, &status, position, numeric_id, now);
        let id = LeadId::new(self.store.insert(self.collection(), fields).await?);
        info!(lead_id = %id, numeric_id, status = %status, position, "lead created");
        Ok(id)
    }

    pub async fn get_lead(&self, id: &LeadId) -> LeadflowResult<Option<Lead>> {
        self.check_id(id)?;
        let doc = self.store.get_by_id(self.collection(), id.as_str()).await?;
        Ok(doc.map(|d| decode_lead(&d, &self.config.default_status)))
    }

    /// All leads with usable ids, in column order.
    pub async fn list_leads(&self) -> LeadflowResult<Vec<Lead>> {
        let docs = self.store.get_all(self.collection()).await?;
        let leads = self.decode_all(&docs);
        let (kept, _) = discard_malformed(leads, &self.config.invalid_id_sentinels);
        Ok(flatten(partition_owned(kept)))
    }

    /// Leads in one stage, most recently active first.
    pub async fn list_by_status(&self, status: &LeadStatus) -> LeadflowResult<Vec<Lead>> {
        let docs = self
            .store
            .query_eq(self.collection(), fields::STATUS, &json!(status))
            .await?;
        let leads = self.decode_all(&docs);
        let (mut kept, _) = discard_malformed(leads, &self.config.invalid_id_sentinels);
        kept.sort_by_key(|l| Reverse(l.last_activity));
        Ok(kept)
    }

    /// Apply a partial update.
    ///
    /// A status change without an explicit position puts the lead at the
    /// bottom of its new column.
    pub async fn update_lead(&self, id: &LeadId, patch: LeadPatch) -> LeadflowResult<()> {
        self.check_id(id)?;
        if let Some(position) = patch.position {
            Self::check_position(id, position)?;
        }
        if let Some(status) = &patch.status {
            Self::check_status(status)?;
        }

        let current = self
            .store
            .get_by_id(self.collection(), id.as_str())
            .await?
            .ok_or_else(|| self.not_found(id))?;
        let current = decode_lead(&current, &self.config.default_status);

        let mut patch = patch;
        if let Some(status) = &patch.status {
            if *status != current.status && patch.position.is_none() {
                patch.position = Some(self.end_of_column(status).await?);
            }
        }

        self.store
            .update_fields(self.collection(), id.as_str(), encode_patch(&patch, Utc::now()))
            .await?;
        debug!(lead_id = %id, "lead updated");
        Ok(())
    }

    /// Remove a lead. Remaining positions are not renumbered.
    pub async fn delete_lead(&self, id: &LeadId) -> LeadflowResult<()> {
        self.check_id(id)?;
        self.store.delete(self.collection(), id.as_str()).await?;
        info!(lead_id = %id, "lead deleted");
        Ok(())
    }

    /// Append an activity and refresh `lastActivity`.
    pub async fn add_activity(
        &self,
        id: &LeadId,
        kind: ActivityKind,
        input: NewActivity,
    ) -> LeadflowResult<Activity> {
        self.check_id(id)?;
        let doc = self
            .store
            .get_by_id(self.collection(), id.as_str())
            .await?
            .ok_or_else(|| self.not_found(id))?;
        let mut activities = decode_lead(&doc, &self.config.default_status)
            .details
            .activities;

        let now = Utc::now();
        let next_id = activities
            .max_id()
            .map_or(i64::MIN, |max| max.saturating_add(1))
            .max(now.timestamp_millis());
        let activity = Activity {
            id: next_id,
            kind,
            title: input.title,
            description: input.description,
            date: Some(now),
            status: input.status,
            duration: input.duration,
            attachments: input.attachments,
        };
        activities.push(activity.clone());

        self.store
            .update_fields(self.collection(), id.as_str(), encode_activities(&activities, now))
            .await?;
        debug!(lead_id = %id, kind = kind.list_key(), activity_id = next_id, "activity added");
        Ok(activity)
    }

    /// Number of leads in the collection.
    pub async fn count(&self) -> LeadflowResult<usize> {
        self.store.count(self.collection()).await
    }

    /// True once the collection holds any lead.
    pub async fn is_seeded(&self) -> LeadflowResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// Insert `leads` in one batch and return their new ids.
    ///
    /// Leads without a position are appended to their column, after both the
    /// stored leads and earlier entries of the same seed.
    pub async fn seed_leads(&self, leads: &[NewLead]) -> LeadflowResult<Vec<LeadId>> {
        if leads.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.store.get_all(self.collection()).await?;
        let mut taken: HashMap<LeadStatus, Vec<Option<Position>>> = HashMap::new();
        for lead in self.decode_all(&docs) {
            taken.entry(lead.status).or_default().push(lead.position);
        }

        let now = Utc::now();
        let base = now.timestamp_millis();
        let mut ids = Vec::with_capacity(leads.len());
        let mut writes = Vec::with_capacity(leads.len());
        for (offset, new_lead) in (0i64..).zip(leads) {
            let status = new_lead
                .status
                .clone()
                .unwrap_or_else(|| self.config.default_status.clone());
            Self::check_status(&status)?;
            let column = taken.entry(status.clone()).or_default();
            let position = match new_lead.position {
                Some(p) if p < 0 => {
                    return Err(ValidationError::InvalidPosition {
                        id: String::new(),
                        value: p.to_string(),
                    }
                    .into())
                }
                Some(p) => p,
                None => allocate(column.iter().copied()).ok_or_else(|| Self::column_full(&status))?,
            };
            column.push(Some(position));

            let id = LeadId::new(Uuid::now_v7().simple().to_string());
            let fields = encode_new_lead(new_lead, &status, position, base + offset, now);
            writes.push(DocumentWrite::merge(id.as_str(), fields));
            ids.push(id);
        }

        self.store.batch_write(self.collection(), writes).await?;
        info!(collection = %self.collection(), seeded = ids.len(), "leads seeded");
        Ok(ids)
    }

    /// Seed `leads` only when the collection is empty.
    ///
    /// Returns the new ids, or `None` when the collection already had data.
    pub async fn seed_if_empty(&self, leads: &[NewLead]) -> LeadflowResult<Option<Vec<LeadId>>> {
        if self.is_seeded().await? {
            debug!(collection = %self.collection(), "collection already seeded");
            return Ok(None);
        }
        self.seed_leads(leads).await.map(Some)
    }

    /// Give every lead without a readable `numericId` one, in one batch.
    ///
    /// A lead whose key is a number gets that number; any other lead gets a
    /// millisecond timestamp, stepped so that values within a run are
    /// distinct. Leads with unusable keys are left alone.
    pub async fn migrate_numeric_ids(&self) -> LeadflowResult<usize> {
        let docs = self.store.get_all(self.collection()).await?;
        let base = Utc::now().timestamp_millis();
        let mut generated = 0i64;
        let mut writes = Vec::new();
        for doc in &docs {
            if doc.get(fields::NUMERIC_ID).and_then(numeric_id_value).is_some() {
                continue;
            }
            if LeadId::new(doc.id.clone())
                .validate_against(&self.config.invalid_id_sentinels)
                .is_err()
            {
                debug!(lead_id = %doc.id, "unusable key; not migrating");
                continue;
            }
            let numeric_id = match doc.id.trim().parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    generated += 1;
                    base + generated
                }
            };
            writes.push(DocumentWrite::update(doc.id.as_str(), encode_numeric_id(numeric_id)));
        }

        let migrated = writes.len();
        if migrated == 0 {
            info!(collection = %self.collection(), "no leads need a numeric id");
            return Ok(0);
        }
        self.store.batch_write(self.collection(), writes).await?;
        info!(collection = %self.collection(), migrated, "numeric ids assigned");
        Ok(migrated)
    }

    /// Run every data migration. Intended for startup.
    pub async fn run_migrations(&self) -> LeadflowResult<MigrationReport> {
        info!(collection = %self.collection(), "running data migrations");
        let report = MigrationReport {
            numeric_ids: self.migrate_numeric_ids().await?,
        };
        info!(numeric_ids = report.numeric_ids, "data migrations complete");
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::LeadflowError;
    use leadflow_storage::{Fields, InMemoryDocumentStore};

    fn service() -> (Arc<InMemoryDocumentStore>, LeadService<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        (store.clone(), LeadService::new(store, BoardConfig::default()))
    }

    fn seed(store: &InMemoryDocumentStore, id: &str, value: serde_json::Value) {
        let fields: Fields = value.as_object().cloned().unwrap();
        store.seed("leads", id, fields).unwrap();
    }

    #[tokio::test]
    async fn test_create_allocates_end_of_column() {
        let (store, svc) = service();
        seed(&store, "a", json!({"status": "New", "position": 3}));
        seed(&store, "b", json!({"status": "New", "position": 1}));
        seed(&store, "c", json!({"status": "Contacted", "position": 8}));

        let id = svc.create_lead(NewLead::default()).await.unwrap();
        let lead = svc.get_lead(&id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::new_lead());
        assert_eq!(lead.position, Some(4));
        assert!(lead.created_at.is_some());
        assert_eq!(lead.details.value.as_deref(), Some("$0"));
    }

    #[tokio::test]
    async fn test_create_stamps_numeric_id() {
        let (store, svc) = service();
        let before = Utc::now().timestamp_millis();
        let id = svc.create_lead(NewLead::default()).await.unwrap();
        let lead = svc.get_lead(&id).await.unwrap().unwrap();
        let numeric_id = lead.numeric_id.unwrap();
        assert!(numeric_id >= before);
        assert_eq!(store.document("leads", id.as_str()).unwrap()[fields::NUMERIC_ID], numeric_id);
    }

    #[tokio::test]
    async fn test_create_in_full_column_is_rejected() {
        let (store, svc) = service();
        seed(&store, "edge", json!({"status": "New", "position": i64::MAX}));
        let err = svc.create_lead(NewLead::default()).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::ColumnFull { .. })));
        assert_eq!(store.len("leads"), 1);
    }

    #[tokio::test]
    async fn test_blank_status_is_rejected() {
        let (store, svc) = service();
        seed(&store, "a", json!({"status": "New", "position": 1}));
        let blank = NewLead {
            status: Some(LeadStatus::new("  ")),
            ..Default::default()
        };
        let err = svc.create_lead(blank).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::InvalidValue { .. })));

        let patch = LeadPatch {
            status: Some(LeadStatus::new("")),
            ..Default::default()
        };
        let err = svc.update_lead(&LeadId::new("a"), patch).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_create_in_empty_column_starts_at_one() {
        let (_, svc) = service();
        let new_lead = NewLead {
            status: Some(LeadStatus::qualified()),
            ..Default::default()
        };
        let id = svc.create_lead(new_lead).await.unwrap();
        assert_eq!(svc.get_lead(&id).await.unwrap().unwrap().position, Some(1));
    }

    #[tokio::test]
    async fn test_create_rejects_negative_position() {
        let (_, svc) = service();
        let new_lead = NewLead {
            position: Some(-1),
            ..Default::default()
        };
        let err = svc.create_lead(new_lead).await.unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::InvalidPosition { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_lead_is_not_found() {
        let (_, svc) = service();
        let err = svc
            .update_lead(&LeadId::new("nope"), LeadPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Storage(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_rejects_placeholder_id() {
        let (_, svc) = service();
        let err = svc
            .update_lead(&LeadId::new("NaN"), LeadPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::InvalidId { .. })));
    }

    #[tokio::test]
    async fn test_field_edit_keeps_position() {
        let (store, svc) = service();
        seed(&store, "a", json!({"status": "New", "position": 5, "company": "Old"}));
        let patch = LeadPatch {
            company: Some("New Co".to_string()),
            ..Default::default()
        };
        svc.update_lead(&LeadId::new("a"), patch).await.unwrap();
        let doc = store.document("leads", "a").unwrap();
        assert_eq!(doc["company"], "New Co");
        assert_eq!(doc["position"], 5);
        assert!(doc.contains_key("lastActivity"));
    }

    #[tokio::test]
    async fn test_status_edit_moves_to_end_of_column() {
        let (store, svc) = service();
        seed(&store, "a", json!({"status": "New", "position": 1}));
        seed(&store, "b", json!({"status": "Contacted", "position": 6}));
        let patch = LeadPatch {
            status: Some(LeadStatus::contacted()),
            ..Default::default()
        };
        svc.update_lead(&LeadId::new("a"), patch).await.unwrap();
        let lead = svc.get_lead(&LeadId::new("a")).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::contacted());
        assert_eq!(lead.position, Some(7));
    }

    #[tokio::test]
    async fn test_list_leads_drops_bad_ids_and_orders() {
        let (store, svc) = service();
        seed(&store, "b", json!({"status": "New", "position": 2}));
        seed(&store, "a", json!({"status": "New", "position": 1}));
        seed(&store, "undefined", json!({"status": "New", "position": 3}));
        let leads = svc.list_leads().await.unwrap();
        let ids: Vec<&str> = leads.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_by_status_most_recent_first() {
        let (store, svc) = service();
        seed(&store, "old", json!({"status": "Qualified", "lastActivity": "2024-01-01T00:00:00Z"}));
        seed(&store, "new", json!({"status": "Qualified", "lastActivity": "2024-06-01T00:00:00Z"}));
        seed(&store, "other", json!({"status": "New"}));
        let leads = svc.list_by_status(&LeadStatus::qualified()).await.unwrap();
        let ids: Vec<&str> = leads.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_delete_leaves_gap() {
        let (store, svc) = service();
        seed(&store, "a", json!({"status": "New", "position": 1}));
        seed(&store, "b", json!({"status": "New", "position": 2}));
        svc.delete_lead(&LeadId::new("a")).await.unwrap();
        let leads = svc.list_leads().await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].position, Some(2));
    }

    #[tokio::test]
    async fn test_add_activity() {
        let (store, svc) = service();
        seed(
            &store,
            "a",
            json!({"status": "New", "activities": {"calls": [{"id": 9_999_999_999_999i64, "title": "Intro"}]}}),
        );
        let input = NewActivity {
            title: "Follow-up".to_string(),
            ..Default::default()
        };
        let activity = svc
            .add_activity(&LeadId::new("a"), ActivityKind::Call, input)
            .await
            .unwrap();
        assert_eq!(activity.id, 10_000_000_000_000);
        assert!(activity.date.is_some());

        let lead = svc.get_lead(&LeadId::new("a")).await.unwrap().unwrap();
        assert_eq!(lead.details.activities.calls.len(), 2);
        assert!(lead.last_activity.is_some());
    }

    #[tokio::test]
    async fn test_add_activity_to_missing_lead() {
        let (_, svc) = service();
        let err = svc
            .add_activity(&LeadId::new("gone"), ActivityKind::Note, NewActivity::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Storage(StorageError::NotFound { .. })));
    }

    // ========================================================================
    // SEEDING AND MIGRATIONS
    // ========================================================================

    fn seed_input(status: &str, position: Option<Position>) -> NewLead {
        NewLead {
            status: Some(LeadStatus::new(status)),
            position,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_count_and_is_seeded() {
        let (store, svc) = service();
        assert_eq!(svc.count().await.unwrap(), 0);
        assert!(!svc.is_seeded().await.unwrap());
        seed(&store, "a", json!({"status": "New"}));
        assert_eq!(svc.count().await.unwrap(), 1);
        assert!(svc.is_seeded().await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_leads_writes_one_batch_and_appends() {
        let (store, svc) = service();
        seed(&store, "old", json!({"status": "New", "position": 2}));
        let ids = svc
            .seed_leads(&[
                seed_input("New", None),
                seed_input("Contacted", Some(5)),
                seed_input("Contacted", None),
                seed_input("New", None),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(store.batch_commits(), 1);
        assert_eq!(svc.count().await.unwrap(), 5);

        let mut seeded = Vec::new();
        for id in &ids {
            seeded.push(svc.get_lead(id).await.unwrap().unwrap());
        }
        let positions: Vec<Option<Position>> = seeded.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![Some(3), Some(5), Some(6), Some(4)]);

        let mut numeric: Vec<i64> = seeded.iter().filter_map(|l| l.numeric_id).collect();
        numeric.dedup();
        assert_eq!(numeric.len(), 4);
    }

    #[tokio::test]
    async fn test_seed_leads_rejects_negative_position_without_writing() {
        let (store, svc) = service();
        let err = svc
            .seed_leads(&[seed_input("New", None), seed_input("New", Some(-2))])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Validation(ValidationError::InvalidPosition { .. })));
        assert_eq!(store.len("leads"), 0);
    }

    #[tokio::test]
    async fn test_seed_if_empty_only_seeds_once() {
        let (_, svc) = service();
        let first = svc.seed_if_empty(&[seed_input("New", None)]).await.unwrap();
        assert_eq!(first.map(|ids| ids.len()), Some(1));
        let second = svc.seed_if_empty(&[seed_input("New", None)]).await.unwrap();
        assert!(second.is_none());
        assert_eq!(svc.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrate_numeric_ids() {
        let (store, svc) = service();
        seed(&store, "1042", json!({"status": "New"}));
        seed(&store, "abc", json!({"status": "New"}));
        seed(&store, "xyz", json!({"status": "New", "numericId": "oops"}));
        seed(&store, "kept", json!({"status": "New", "numericId": 7}));
        seed(&store, "undefined", json!({"status": "New"}));

        let migrated = svc.migrate_numeric_ids().await.unwrap();
        assert_eq!(migrated, 3);
        assert_eq!(store.batch_commits(), 1);

        let numeric = |id: &str| store.document("leads", id).unwrap().get(fields::NUMERIC_ID).cloned();
        assert_eq!(numeric("1042"), Some(json!(1042)));
        assert_eq!(numeric("kept"), Some(json!(7)));
        assert!(numeric("undefined").is_none());
        let abc = numeric("abc").and_then(|v| v.as_i64()).unwrap();
        let xyz = numeric("xyz").and_then(|v| v.as_i64()).unwrap();
        assert_ne!(abc, xyz);

        // Nothing left to do on a second run.
        let report = svc.run_migrations().await.unwrap();
        assert_eq!(report, MigrationReport { numeric_ids: 0 });
        assert_eq!(store.batch_commits(), 1);
    }

    #[tokio::test]
    async fn test_migration_failure_is_returned() {
        let (store, svc) = service();
        seed(&store, "abc", json!({"status": "New"}));
        store.fail_next_batches(1);
        let err = svc.run_migrations().await.unwrap_err();
        assert!(matches!(err, LeadflowError::Storage(StorageError::BatchFailed { .. })));
        assert!(store.document("leads", "abc").unwrap().get(fields::NUMERIC_ID).is_none());
    }
}
