//! Conversion between stored lead documents and [`Lead`].
//!
//! Stored documents were written by several generations of clients, so
//! decoding never fails: a field that cannot be read is treated as absent and
//! the rest of the record is kept.

use chrono::{DateTime, SecondsFormat, Utc};
use leadflow_core::{
    Activities, Activity, ActivityKind, Lead, LeadDetails, LeadId, LeadPatch, LeadStatus, NewLead,
    Position, Timestamp,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{Fields, RawDocument};

/// Stored field names.
pub mod fields {
    pub const STATUS: &str = "status";
    pub const POSITION: &str = "position";
    pub const LAST_ACTIVITY: &str = "lastActivity";
    pub const CREATED_AT: &str = "createdAt";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    /// Single-string name written by early clients.
    pub const LEGACY_NAME: &str = "name";
    pub const COMPANY: &str = "company";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const VALUE: &str = "value";
    pub const TAGS: &str = "tags";
    pub const ACTIVITIES: &str = "activities";
    pub const NUMERIC_ID: &str = "numericId";

    pub(crate) const KNOWN: [&str; 14] = [
        STATUS,
        POSITION,
        LAST_ACTIVITY,
        CREATED_AT,
        FIRST_NAME,
        LAST_NAME,
        LEGACY_NAME,
        COMPANY,
        EMAIL,
        PHONE,
        VALUE,
        TAGS,
        ACTIVITIES,
        NUMERIC_ID,
    ];
}

// ============================================================================
// SCALAR DECODING
// ============================================================================

/// Read a position: a finite, non-negative, integral number.
pub fn position_value(value: &Value) -> Option<Position> {
    let number = value.as_number()?;
    if let Some(i) = number.as_i64() {
        return (i >= 0).then_some(i);
    }
    let f = number.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Read a numeric id: an integral number or a string holding one.
pub fn numeric_id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric id of a stored document: its `numericId` field, else its key
/// when the key is itself a number.
pub fn stored_numeric_id(doc: &RawDocument) -> Option<i64> {
    doc.get(fields::NUMERIC_ID)
        .and_then(numeric_id_value)
        .or_else(|| doc.id.trim().parse().ok())
}

/// Read an RFC 3339 timestamp string.
pub fn timestamp_value(value: &Value) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn timestamp_json(at: Timestamp) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn string_field(fields: &Fields, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn tags_field(fields: &Fields) -> Vec<String> {
    match fields.get(fields::TAGS) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn activity_list(raw: Option<&Value>, kind: ActivityKind, lead_id: &str) -> Vec<Activity> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let mut item = item.clone();
            if let Some(obj) = item.as_object_mut() {
                if obj.get("date").is_some_and(|d| timestamp_value(d).is_none()) {
                    obj.remove("date");
                }
                obj.entry("type").or_insert_with(|| json!(kind));
            }
            match serde_json::from_value::<Activity>(item) {
                Ok(activity) => Some(activity),
                Err(e) => {
                    debug!(lead_id, kind = kind.list_key(), error = %e, "dropping unreadable activity");
                    None
                }
            }
        })
        .collect()
}

fn activities_field(fields: &Fields, lead_id: &str) -> Activities {
    let raw = fields.get(fields::ACTIVITIES).and_then(Value::as_object);
    let list = |kind: ActivityKind| {
        activity_list(raw.and_then(|r| r.get(kind.list_key())), kind, lead_id)
    };
    Activities {
        calls: list(ActivityKind::Call),
        notes: list(ActivityKind::Note),
        emails: list(ActivityKind::Email),
        meetings: list(ActivityKind::Meeting),
        documents: list(ActivityKind::Document),
    }
}

// ============================================================================
// LEAD DECODING
// ============================================================================

/// Decode a stored document into a lead.
///
/// A missing or non-string status falls back to `default_status`.
pub fn decode_lead(doc: &RawDocument, default_status: &LeadStatus) -> Lead {
    let f = &doc.fields;

    let status = f
        .get(fields::STATUS)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(LeadStatus::new)
        .unwrap_or_else(|| default_status.clone());

    let mut first_name = string_field(f, fields::FIRST_NAME);
    let mut last_name = string_field(f, fields::LAST_NAME);
    if first_name.is_empty() && last_name.is_empty() {
        let legacy = string_field(f, fields::LEGACY_NAME);
        let mut parts = legacy.split_whitespace();
        first_name = parts.next().unwrap_or_default().to_string();
        last_name = parts.collect::<Vec<_>>().join(" ");
    }

    let extra = f
        .iter()
        .filter(|(k, _)| !fields::KNOWN.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Lead {
        id: LeadId::new(doc.id.clone()),
        status,
        position: f.get(fields::POSITION).and_then(position_value),
        last_activity: f.get(fields::LAST_ACTIVITY).and_then(timestamp_value),
        created_at: f.get(fields::CREATED_AT).and_then(timestamp_value),
        numeric_id: stored_numeric_id(doc),
        details: LeadDetails {
            first_name,
            last_name,
            company: string_field(f, fields::COMPANY),
            email: string_field(f, fields::EMAIL),
            phone: string_field(f, fields::PHONE),
            value: f.get(fields::VALUE).and_then(Value::as_str).map(str::to_string),
            tags: tags_field(f),
            activities: activities_field(f, &doc.id),
            extra,
        },
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Fields for a freshly created lead.
pub fn encode_new_lead(
    lead: &NewLead,
    status: &LeadStatus,
    position: Position,
    numeric_id: i64,
    now: Timestamp,
) -> Fields {
    let d = &lead.details;
    let mut out = d.extra.clone();
    out.insert(fields::STATUS.into(), json!(status));
    out.insert(fields::POSITION.into(), json!(position));
    out.insert(fields::NUMERIC_ID.into(), json!(numeric_id));
    out.insert(fields::CREATED_AT.into(), timestamp_json(now));
    out.insert(fields::LAST_ACTIVITY.into(), timestamp_json(now));
    out.insert(fields::FIRST_NAME.into(), json!(d.first_name));
    out.insert(fields::LAST_NAME.into(), json!(d.last_name));
    out.insert(fields::COMPANY.into(), json!(d.company));
    out.insert(fields::EMAIL.into(), json!(d.email));
    out.insert(fields::PHONE.into(), json!(d.phone));
    out.insert(
        fields::VALUE.into(),
        json!(d.value.clone().unwrap_or_else(|| "$0".to_string())),
    );
    out.insert(fields::TAGS.into(), json!(d.tags));
    out.insert(fields::ACTIVITIES.into(), json!(d.activities));
    out
}

/// Fields for a partial update. `lastActivity` is always refreshed.
pub fn encode_patch(patch: &LeadPatch, now: Timestamp) -> Fields {
    let mut out = Fields::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(v) = value {
            out.insert(key.to_string(), v);
        }
    };
    put(fields::STATUS, patch.status.as_ref().map(|s| json!(s)));
    put(fields::POSITION, patch.position.map(|p| json!(p)));
    put(fields::FIRST_NAME, patch.first_name.as_ref().map(|v| json!(v)));
    put(fields::LAST_NAME, patch.last_name.as_ref().map(|v| json!(v)));
    put(fields::COMPANY, patch.company.as_ref().map(|v| json!(v)));
    put(fields::EMAIL, patch.email.as_ref().map(|v| json!(v)));
    put(fields::PHONE, patch.phone.as_ref().map(|v| json!(v)));
    put(fields::VALUE, patch.value.as_ref().map(|v| json!(v)));
    put(fields::TAGS, patch.tags.as_ref().map(|v| json!(v)));
    put(fields::LAST_ACTIVITY, Some(timestamp_json(now)));
    out
}

/// Fields written for a position change.
pub fn encode_position(position: Position, now: Timestamp) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::POSITION.into(), json!(position));
    out.insert(fields::LAST_ACTIVITY.into(), timestamp_json(now));
    out
}

/// Fields written for a column transition.
pub fn encode_status_move(status: &LeadStatus, position: Position, now: Timestamp) -> Fields {
    let mut out = encode_position(position, now);
    out.insert(fields::STATUS.into(), json!(status));
    out
}

/// Fields written by the numeric id migration.
pub fn encode_numeric_id(numeric_id: i64) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::NUMERIC_ID.into(), json!(numeric_id));
    out
}

/// Fields written when an activity is appended.
pub fn encode_activities(activities: &Activities, now: Timestamp) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::ACTIVITIES.into(), json!(activities));
    out.insert(fields::LAST_ACTIVITY.into(), timestamp_json(now));
    out
}

// ============================================================================
// TESTS
// ============================================================================
