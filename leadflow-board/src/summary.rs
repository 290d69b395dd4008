//! Board summary figures: counts, pipeline value and conversion rate.

use leadflow_core::{ColumnDef, Lead, LeadStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::partition::{board_columns, partition};

/// Everything that is not part of a plain decimal number.
static CURRENCY_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-]+").expect("Invalid currency regex"));

/// Parse a deal value such as `"$12,500"`. Unreadable values count as zero.
pub fn parse_value(raw: &str) -> f64 {
    CURRENCY_NOISE
        .replace_all(raw, "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn lead_value(lead: &Lead) -> f64 {
    lead.details.value.as_deref().map_or(0.0, parse_value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub status: LeadStatus,
    pub title: String,
    pub count: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    pub total_leads: usize,
    pub total_value: f64,
    /// Configured columns first, then any other statuses found.
    pub columns: Vec<ColumnSummary>,
    /// Share of leads in the qualified stage, as a rounded percentage.
    pub conversion_rate: u32,
}

/// Summarize a loaded board.
pub fn summarize(leads: &[Lead], defs: &[ColumnDef]) -> BoardSummary {
    let total_leads = leads.len();
    let total_value = leads.iter().map(lead_value).sum();

    let columns = board_columns(partition(leads), defs)
        .into_iter()
        .map(|(status, members)| {
            let title = defs
                .iter()
                .find(|d| d.id == status)
                .map_or_else(|| status.to_string(), |d| d.title.clone());
            ColumnSummary {
                title,
                count: members.len(),
                value: members.iter().map(lead_value).sum(),
                status,
            }
        })
        .collect();

    let qualified = leads
        .iter()
        .filter(|l| l.status.as_str().eq_ignore_ascii_case(leadflow_core::stage::QUALIFIED))
        .count();
    let conversion_rate = if total_leads == 0 {
        0
    } else {
        ((qualified as f64 / total_leads as f64) * 100.0).round() as u32
    };

    BoardSummary {
        total_leads,
        total_value,
        columns,
        conversion_rate,
    }
}
