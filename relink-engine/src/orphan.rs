//! Orphan Matcher
//!
//! Suggests the paid order an orphaned subscription most likely came from,
//! by creation time proximity.

use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::model::{DependentRecord, OrderKind, ParentRecord};
use crate::store::OrderStore;

/// Half-width of the matching window
pub const DEFAULT_MATCH_WINDOW_SECS: i64 = 60;

pub struct OrphanMatcher {
    orders: Arc<dyn OrderStore>,
    window: Duration,
}

impl OrphanMatcher {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self::with_window(orders, Duration::seconds(DEFAULT_MATCH_WINDOW_SECS))
    }

    pub fn with_window(orders: Arc<dyn OrderStore>, window: Duration) -> Self {
        Self { orders, window }
    }

    /// Best candidate order for `orphan`; `None` for non-orphans
    pub async fn find_match(&self, orphan: &DependentRecord) -> Result<Option<ParentRecord>> {
        if !orphan.is_orphan() {
            return Ok(None);
        }

        let created = orphan.created_at;
        let candidates = self
            .orders
            .orders_created_between(created - self.window, created + self.window)
            .await?;

        let best = select_closest(orphan, &candidates, self.window).cloned();
        debug!(
            subscription_id = orphan.id,
            candidates = candidates.len(),
            suggested_order = best.as_ref().map(|o| o.id).unwrap_or(0),
            "Orphan match computed"
        );
        Ok(best)
    }
}

/// Eligible candidate closest in time to the orphan
///
/// Eligible means a regular order, paid, with an owner, created within
/// `window` of the orphan. Ties keep the earliest candidate in slice order.
pub fn select_closest<'a>(
    orphan: &DependentRecord,
    candidates: &'a [ParentRecord],
    window: Duration,
) -> Option<&'a ParentRecord> {
    let window_ms = window.num_milliseconds();
    candidates
        .iter()
        .filter(|o| o.kind == OrderKind::Order)
        .filter(|o| o.status.is_paid())
        .filter(|o| o.customer_id.is_some())
        .map(|o| (o, (o.created_at - orphan.created_at).num_milliseconds().abs()))
        .filter(|(_, diff)| *diff <= window_ms)
        .min_by_key(|(_, diff)| *diff)
        .map(|(o, _)| o)
}
