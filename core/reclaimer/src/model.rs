//! Work-item rows as the reclamation scan reads them.

use chrono::{DateTime, Utc};
use tracing::warn;
use veridoc_records::Record;

pub const WORK_ITEMS: &str = "work_items";
pub const TIMEOUT_POLICIES: &str = "timeout_policies";

/// Closed status set for a work item. `claimed_by`/`claimed_at` are set and
/// cleared together with transitions in and out of `Claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemStatus {
    Unclaimed,
    Claimed,
    Done,
    Error,
}

impl WorkItemStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unclaimed" => Some(WorkItemStatus::Unclaimed),
            "claimed" => Some(WorkItemStatus::Claimed),
            "done" => Some(WorkItemStatus::Done),
            "error" => Some(WorkItemStatus::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Unclaimed => "unclaimed",
            WorkItemStatus::Claimed => "claimed",
            WorkItemStatus::Done => "done",
            WorkItemStatus::Error => "error",
        }
    }
}

/// A claimed work item with the fields the overdue judgment needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedItem {
    pub id: String,
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
}

impl ClaimedItem {
    /// Parses a row from the claimed-status query. Rows violating the claim
    /// invariant (no claimant or no valid timestamp) are reported and skipped
    /// rather than failing the pass.
    pub fn from_record(record: &Record) -> Option<Self> {
        let claimed_by = match record.str_field("claimed_by") {
            Some(value) => value.to_string(),
            None => {
                warn!(id = %record.id, "claimed work item without claimant; skipping");
                return None;
            }
        };
        let claimed_at = match record.str_field("claimed_at").and_then(parse_rfc3339) {
            Some(value) => value,
            None => {
                warn!(id = %record.id, "claimed work item without valid claimed_at; skipping");
                return None;
            }
        };
        Some(Self {
            id: record.id.clone(),
            claimed_by,
            claimed_at,
        })
    }
}

pub(crate) fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_claimed_row() {
        let record = Record::new("doc-1")
            .with("status", "claimed")
            .with("claimed_by", "staff-1")
            .with("claimed_at", "2026-08-30T10:00:00Z");
        let item = ClaimedItem::from_record(&record).expect("parses");
        assert_eq!(item.id, "doc-1");
        assert_eq!(item.claimed_by, "staff-1");
        assert_eq!(item.claimed_at.to_rfc3339(), "2026-08-30T10:00:00+00:00");
    }

    #[test]
    fn rejects_rows_violating_the_claim_invariant() {
        let no_claimant = Record::new("doc-1")
            .with("status", "claimed")
            .with("claimed_at", "2026-08-30T10:00:00Z");
        assert_eq!(ClaimedItem::from_record(&no_claimant), None);

        let bad_timestamp = Record::new("doc-2")
            .with("status", "claimed")
            .with("claimed_by", "staff-1")
            .with("claimed_at", "yesterday");
        assert_eq!(ClaimedItem::from_record(&bad_timestamp), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            WorkItemStatus::Unclaimed,
            WorkItemStatus::Claimed,
            WorkItemStatus::Done,
            WorkItemStatus::Error,
        ] {
            assert_eq!(WorkItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WorkItemStatus::parse("archived"), None);
    }
}
