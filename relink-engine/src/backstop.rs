//! Lifecycle Backstop
//!
//! Runs when an order enters a paid status. Sweeps every subscription whose
//! secondary pointer names the order, relinks the stale ones, then triggers
//! the entitlement for the order at most once.
//!
//! The order id is authoritative for the parent reference. An owner already
//! set on the subscription is preserved even if it differs from the order's
//! customer.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::entitlement::{trigger_once, EntitlementAction};
use crate::error::Result;
use crate::model::{OrderStatus, RepairAuditEntry, RepairLayer, RepairOutcome};
use crate::resolver::ReferenceResolver;
use crate::store::{EntitlementConnector, HierarchyStore, SubscriptionStore};

/// Summary of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub order_id: i64,
    /// Subscriptions found through the secondary pointer
    pub examined: usize,
    pub repaired: Vec<i64>,
    /// Subscriptions whose repair failed and were skipped
    pub failed: Vec<i64>,
    pub entitlement: EntitlementAction,
}

pub struct LifecycleBackstop {
    resolver: ReferenceResolver,
    hierarchy: Arc<dyn HierarchyStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    entitlements: Option<Arc<dyn EntitlementConnector>>,
}

impl LifecycleBackstop {
    pub fn new(
        resolver: ReferenceResolver,
        hierarchy: Arc<dyn HierarchyStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        entitlements: Option<Arc<dyn EntitlementConnector>>,
    ) -> Self {
        Self {
            resolver,
            hierarchy,
            subscriptions,
            entitlements,
        }
    }

    /// Whether a transition into `status` triggers a sweep
    pub fn triggers_on(status: &OrderStatus) -> bool {
        status.is_paid()
    }

    /// Sweep the subscriptions of `order_id`
    ///
    /// Fails only if the order's owner or its children cannot be read.
    /// Per-subscription failures are logged and recorded in the report.
    pub async fn sweep(&self, order_id: i64) -> Result<SweepReport> {
        let order_owner = self.resolver.try_owner(order_id).await?;
        let children = self.hierarchy.children_of(order_id).await?;

        let mut report = SweepReport {
            order_id,
            examined: 0,
            repaired: Vec::new(),
            failed: Vec::new(),
            entitlement: EntitlementAction::NoConnector,
        };

        for subscription_id in children {
            match self.relink(subscription_id, order_id, order_owner).await {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    report.examined += 1;
                    if outcome.is_repaired() {
                        report.repaired.push(subscription_id);
                    }
                }
                Err(e) => {
                    report.examined += 1;
                    report.failed.push(subscription_id);
                    warn!(
                        source = "completion-backstop",
                        order_id,
                        subscription_id,
                        error = %e,
                        "Skipping subscription after repair failure"
                    );
                }
            }
        }

        report.entitlement = self.trigger_entitlement(order_id).await;

        info!(
            source = "completion-backstop",
            order_id,
            examined = report.examined,
            repaired = report.repaired.len(),
            failed = report.failed.len(),
            "Completion sweep finished"
        );

        Ok(report)
    }

    /// Repair one child; `Ok(None)` if the child is not a subscription
    async fn relink(
        &self,
        subscription_id: i64,
        order_id: i64,
        order_owner: Option<i64>,
    ) -> Result<Option<RepairOutcome>> {
        let Some(subscription) = self
            .subscriptions
            .find_subscription(subscription_id)
            .await?
        else {
            return Ok(None);
        };

        let target_parent = Some(order_id);
        let target_owner = subscription.customer_id.or(order_owner);

        if subscription.parent_id == target_parent && subscription.customer_id == target_owner {
            return Ok(Some(RepairOutcome::Unchanged));
        }

        self.subscriptions
            .update_references(subscription_id, target_parent, target_owner)
            .await?;

        warn!(
            source = "completion-backstop",
            layer = RepairLayer::CompletionBackstop.tag(),
            subscription_id,
            parent_order_id = order_id,
            customer_id = target_owner.unwrap_or(0),
            "Relinked subscription on order completion"
        );

        let entry = RepairAuditEntry::repair(
            RepairLayer::CompletionBackstop,
            target_parent,
            target_owner,
        );
        if let Err(e) = self.subscriptions.add_note(subscription_id, &entry).await {
            warn!(
                source = "completion-backstop",
                subscription_id,
                error = %e,
                "Repair persisted but audit note could not be written"
            );
        }

        Ok(Some(RepairOutcome::Repaired {
            parent_id: target_parent,
            customer_id: target_owner,
        }))
    }

    async fn trigger_entitlement(&self, order_id: i64) -> EntitlementAction {
        let Some(connector) = &self.entitlements else {
            return EntitlementAction::NoConnector;
        };

        match trigger_once(connector.as_ref(), order_id).await {
            Ok(true) => EntitlementAction::Triggered,
            Ok(false) => EntitlementAction::AlreadyExists,
            Err(e) => {
                warn!(
                    source = "completion-backstop",
                    order_id,
                    error = %e,
                    "Entitlement trigger failed"
                );
                EntitlementAction::Failed
            }
        }
    }
}
