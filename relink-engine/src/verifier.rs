//! Post-Create Verifier
//!
//! Read-after-write check run once when checkout creates a subscription.
//! Recomputes the expected parent and owner from the source order and
//! repairs the live record if it still disagrees.

use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::model::{
    DependentRecord, ParentRecord, RecurringSchedule, RepairAuditEntry, RepairLayer,
    RepairOutcome,
};
use crate::resolver::ReferenceResolver;
use crate::store::SubscriptionStore;

pub struct PostCreateVerifier {
    resolver: ReferenceResolver,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl PostCreateVerifier {
    pub fn new(resolver: ReferenceResolver, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            resolver,
            subscriptions,
        }
    }

    /// Repair `subscription` against its source order
    ///
    /// Only empty references are filled. A non-empty reference that differs
    /// from the expected value is logged and left as is. The live record is
    /// only mutated once the repaired copy has been persisted.
    pub async fn verify(
        &self,
        subscription: &mut DependentRecord,
        order: &ParentRecord,
        _schedule: &RecurringSchedule,
    ) -> Result<RepairOutcome> {
        let expected_parent = match crate::model::non_empty(order.id) {
            Some(order_id) => Some(order_id),
            None => self.resolver.try_secondary_parent(subscription.id).await?,
        };

        let expected_owner = match order.customer_id {
            Some(customer_id) => Some(customer_id),
            None => match expected_parent {
                Some(parent_id) => self.resolver.try_owner(parent_id).await?,
                None => None,
            },
        };

        let mut parent_id = subscription.parent_id;
        let mut customer_id = subscription.customer_id;
        let parent_changed = fill(subscription.id, "parent", &mut parent_id, expected_parent);
        let owner_changed = fill(subscription.id, "customer", &mut customer_id, expected_owner);

        if !parent_changed && !owner_changed {
            return Ok(RepairOutcome::Unchanged);
        }

        self.subscriptions
            .update_references(subscription.id, parent_id, customer_id)
            .await?;
        subscription.parent_id = parent_id;
        subscription.customer_id = customer_id;

        warn!(
            source = "post-create-verifier",
            layer = RepairLayer::CheckoutOrigin.tag(),
            subscription_id = subscription.id,
            parent_order_id = subscription.parent_id.unwrap_or(0),
            customer_id = subscription.customer_id.unwrap_or(0),
            "Repaired subscription references after checkout"
        );

        let entry = RepairAuditEntry::repair(
            RepairLayer::CheckoutOrigin,
            subscription.parent_id,
            subscription.customer_id,
        );
        if let Err(e) = self.subscriptions.add_note(subscription.id, &entry).await {
            warn!(
                source = "post-create-verifier",
                subscription_id = subscription.id,
                error = %e,
                "Repair persisted but audit note could not be written"
            );
        }

        Ok(RepairOutcome::Repaired {
            parent_id: subscription.parent_id,
            customer_id: subscription.customer_id,
        })
    }
}

/// Fill an empty reference; returns whether it changed
fn fill(
    subscription_id: i64,
    field: &str,
    current: &mut Option<i64>,
    expected: Option<i64>,
) -> bool {
    match (*current, expected) {
        (None, Some(value)) => {
            *current = Some(value);
            true
        }
        (Some(existing), Some(value)) if existing != value => {
            warn!(
                source = "post-create-verifier",
                subscription_id,
                field,
                existing,
                expected = value,
                "Subscription reference disagrees with source order, leaving existing value"
            );
            false
        }
        _ => false,
    }
}
