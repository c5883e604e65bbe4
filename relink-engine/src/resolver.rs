//! Reference Resolver
//!
//! Lookups for the two fallback sources of truth: the secondary parent
//! pointer of a record and the owning customer of an order. Absence is an
//! expected outcome and yields `None`.

use std::sync::Arc;
use tracing::debug;

use crate::store::{HierarchyStore, OrderStore};

#[derive(Clone)]
pub struct ReferenceResolver {
    orders: Arc<dyn OrderStore>,
    hierarchy: Arc<dyn HierarchyStore>,
}

impl ReferenceResolver {
    pub fn new(orders: Arc<dyn OrderStore>, hierarchy: Arc<dyn HierarchyStore>) -> Self {
        Self { orders, hierarchy }
    }

    /// Secondary parent pointer of `record_id`
    ///
    /// Store failures are logged at debug level and reported as `None`.
    pub async fn resolve_secondary_parent(&self, record_id: i64) -> Option<i64> {
        match self.try_secondary_parent(record_id).await {
            Ok(parent) => parent,
            Err(e) => {
                debug!(record_id, error = %e, "Secondary parent lookup failed");
                None
            }
        }
    }

    /// Owning customer of order `parent_id`
    ///
    /// Store failures are logged at debug level and reported as `None`.
    pub async fn resolve_owner(&self, parent_id: i64) -> Option<i64> {
        match self.try_owner(parent_id).await {
            Ok(owner) => owner,
            Err(e) => {
                debug!(parent_id, error = %e, "Owner lookup failed");
                None
            }
        }
    }

    /// Fallible variant for layers that must abandon their work on store errors
    pub(crate) async fn try_secondary_parent(
        &self,
        record_id: i64,
    ) -> relink_common::Result<Option<i64>> {
        if record_id <= 0 {
            return Ok(None);
        }
        let parent = self.hierarchy.secondary_parent(record_id).await?;
        Ok(parent.and_then(crate::model::non_empty))
    }

    pub(crate) async fn try_owner(&self, parent_id: i64) -> relink_common::Result<Option<i64>> {
        if parent_id <= 0 {
            return Ok(None);
        }
        let order = self.orders.find_order(parent_id).await?;
        Ok(order.and_then(|o| o.customer_id))
    }
}
