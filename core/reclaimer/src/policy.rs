//! Per-actor SLA limits and the overdue judgment.
//!
//! Pure functions over an in-memory table; no store access, so boundary
//! behavior is testable to the millisecond.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::model::ClaimedItem;

/// Applies when neither an actor override nor a global default is configured.
pub const FALLBACK_LIMIT_MINUTES: i64 = 30;

/// SLA limits resolved for one pass: actor override, else global default,
/// else the fallback constant. Total for every actor id.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    global_limit: Option<i64>,
    overrides: HashMap<String, i64>,
}

impl PolicyTable {
    pub fn new(global_limit: Option<i64>) -> Self {
        Self {
            global_limit,
            overrides: HashMap::new(),
        }
    }

    pub fn set_override(&mut self, actor_id: impl Into<String>, limit_minutes: i64) {
        self.overrides.insert(actor_id.into(), limit_minutes);
    }

    pub fn limit_for(&self, actor_id: &str) -> i64 {
        self.overrides
            .get(actor_id)
            .copied()
            .or(self.global_limit)
            .unwrap_or(FALLBACK_LIMIT_MINUTES)
    }
}

/// Whether the claimant has held the item longer than their limit at `now`.
/// Strictly greater: an item exactly at the limit is not yet overdue.
pub fn is_overdue(item: &ClaimedItem, table: &PolicyTable, now: DateTime<Utc>) -> bool {
    let limit = Duration::minutes(table.limit_for(&item.claimed_by));
    now.signed_duration_since(item.claimed_at) > limit
}
