//! One reclamation pass over the claimed work-item set.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use veridoc_records::{Filter, Patch, RecordStore};

use crate::error::ReclamationError;
use crate::model::{ClaimedItem, WorkItemStatus, TIMEOUT_POLICIES, WORK_ITEMS};
use crate::policy::{is_overdue, PolicyTable};

/// Outcome of one pass, in the wire shape the external trigger expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclamationReport {
    /// Rows the conditional update actually flipped. May be smaller than
    /// `released_ids` when an item was completed between scan and write;
    /// those are skipped, not overwritten.
    pub released_count: usize,
    /// The overdue set this pass computed and asked the store to release.
    pub released_ids: Vec<String>,
}

impl ReclamationReport {
    fn empty() -> Self {
        Self {
            released_count: 0,
            released_ids: Vec::new(),
        }
    }
}

/// Stateless scan-and-release job. Invoked on an external cadence; overlapping
/// invocations are safe because the release is one conditional write keyed on
/// `status = claimed`.
pub struct ReclamationScheduler {
    store: Arc<dyn RecordStore>,
}

impl ReclamationScheduler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn run_once(&self) -> Result<ReclamationReport, ReclamationError> {
        let global_limit = self.load_global_limit().await?;
        let claimed = self.load_claimed_items().await?;
        if claimed.is_empty() {
            debug!("no claimed work items; nothing to reclaim");
            return Ok(ReclamationReport::empty());
        }

        let table = self.load_policy_table(global_limit, &claimed).await?;

        // One instant for the whole pass: every item is judged against the
        // same clock reading, so a run cannot straddle an SLA boundary.
        let now = Utc::now();
        let overdue: Vec<String> = claimed
            .iter()
            .filter(|item| is_overdue(item, &table, now))
            .map(|item| item.id.clone())
            .collect();
        if overdue.is_empty() {
            debug!(claimed = claimed.len(), "no claimed work item is overdue");
            return Ok(ReclamationReport::empty());
        }

        // Single conditional bulk write. The status clause is re-checked by
        // the store at write time: an item completed since the scan no longer
        // matches and keeps its new status.
        let released_count = self
            .store
            .update(
                WORK_ITEMS,
                &Filter::new()
                    .eq("status", WorkItemStatus::Claimed.as_str())
                    .one_of("id", overdue.iter().cloned()),
                &Patch::new()
                    .set("status", WorkItemStatus::Unclaimed.as_str())
                    .clear("claimed_by")
                    .clear("claimed_at"),
            )
            .await
            .map_err(ReclamationError::Release)?;

        info!(
            released = released_count,
            overdue = overdue.len(),
            ids = ?overdue,
            "released overdue work items"
        );
        Ok(ReclamationReport {
            released_count,
            released_ids: overdue,
        })
    }

    async fn load_global_limit(&self) -> Result<Option<i64>, ReclamationError> {
        let rows = self
            .store
            .query(TIMEOUT_POLICIES, &Filter::new().eq("scope", "global"))
            .await
            .map_err(|source| ReclamationError::Read {
                collection: TIMEOUT_POLICIES.to_string(),
                source,
            })?;
        Ok(rows
            .iter()
            .find_map(|row| valid_limit(row.i64_field("limit_minutes"), &row.id)))
    }

    async fn load_claimed_items(&self) -> Result<Vec<ClaimedItem>, ReclamationError> {
        let rows = self
            .store
            .query(
                WORK_ITEMS,
                &Filter::new().eq("status", WorkItemStatus::Claimed.as_str()),
            )
            .await
            .map_err(|source| ReclamationError::Read {
                collection: WORK_ITEMS.to_string(),
                source,
            })?;
        Ok(rows.iter().filter_map(ClaimedItem::from_record).collect())
    }

    async fn load_policy_table(
        &self,
        global_limit: Option<i64>,
        claimed: &[ClaimedItem],
    ) -> Result<PolicyTable, ReclamationError> {
        let claimants: BTreeSet<&str> = claimed
            .iter()
            .map(|item| item.claimed_by.as_str())
            .collect();
        let rows = self
            .store
            .query(
                TIMEOUT_POLICIES,
                &Filter::new().one_of("scope", claimants.iter().copied()),
            )
            .await
            .map_err(|source| ReclamationError::Read {
                collection: TIMEOUT_POLICIES.to_string(),
                source,
            })?;

        let mut table = PolicyTable::new(global_limit);
        for row in &rows {
            let Some(scope) = row.str_field("scope") else {
                continue;
            };
            if let Some(limit) = valid_limit(row.i64_field("limit_minutes"), &row.id) {
                table.set_override(scope, limit);
            }
        }
        Ok(table)
    }
}

fn valid_limit(limit: Option<i64>, policy_id: &str) -> Option<i64> {
    match limit {
        Some(minutes) if minutes > 0 => Some(minutes),
        Some(minutes) => {
            warn!(policy_id, minutes, "ignoring non-positive timeout policy");
            None
        }
        None => {
            warn!(policy_id, "timeout policy without limit_minutes; ignoring");
            None
        }
    }
}
