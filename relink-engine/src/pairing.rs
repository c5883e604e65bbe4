//! Manual Pairing Service
//!
//! Administrator-triggered link of an orphaned subscription to an order.
//! This is the only layer that reports failure to its caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::entitlement::trigger_once;
use crate::error::PairingError;
use crate::model::{RepairAuditEntry, SubscriptionStatus};
use crate::store::{EntitlementConnector, OrderStore, PairingAuthorizer, SubscriptionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRequest {
    pub subscription_id: i64,
    pub order_id: i64,
}

/// Final linkage after a successful pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingReceipt {
    pub subscription_id: i64,
    pub order_id: i64,
    pub customer_id: i64,
    pub status: SubscriptionStatus,
    pub entitlement_triggered: bool,
}

/// Response contract: success flag, message, status code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingResponse {
    pub success: bool,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PairingReceipt>,
}

impl From<Result<PairingReceipt, PairingError>> for PairingResponse {
    fn from(result: Result<PairingReceipt, PairingError>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                message: format!(
                    "Subscription #{} linked to order #{} (customer #{})",
                    receipt.subscription_id, receipt.order_id, receipt.customer_id
                ),
                code: 200,
                data: Some(receipt),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
                code: e.status_code(),
                data: None,
            },
        }
    }
}

pub struct PairingService {
    orders: Arc<dyn OrderStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    entitlements: Option<Arc<dyn EntitlementConnector>>,
    authorizer: Arc<dyn PairingAuthorizer>,
}

impl PairingService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        entitlements: Option<Arc<dyn EntitlementConnector>>,
        authorizer: Arc<dyn PairingAuthorizer>,
    ) -> Self {
        Self {
            orders,
            subscriptions,
            entitlements,
            authorizer,
        }
    }

    /// Link an orphan to an order on behalf of `actor_id`
    ///
    /// Checks run in order: authorization, id validity, existence, orphan
    /// state, order owner. Nothing is written until all of them pass.
    pub async fn pair(
        &self,
        actor_id: i64,
        nonce: &str,
        request: PairingRequest,
    ) -> Result<PairingReceipt, PairingError> {
        self.authorize(actor_id, nonce).await?;

        let PairingRequest {
            subscription_id,
            order_id,
        } = request;
        if subscription_id <= 0 || order_id <= 0 {
            return Err(PairingError::InvalidRequest(
                "Subscription and order ids must be positive integers".to_string(),
            ));
        }

        let subscription = self
            .subscriptions
            .find_subscription(subscription_id)
            .await
            .map_err(|e| {
                internal(
                    "Subscription lookup failed",
                    subscription_id,
                    order_id,
                    actor_id,
                    e,
                )
            })?
            .ok_or_else(|| {
                PairingError::NotFound(format!("Subscription #{} not found", subscription_id))
            })?;

        let order = self
            .orders
            .find_order(order_id)
            .await
            .map_err(|e| {
                internal(
                    "Order lookup failed",
                    subscription_id,
                    order_id,
                    actor_id,
                    e,
                )
            })?
            .ok_or_else(|| PairingError::NotFound(format!("Order #{} not found", order_id)))?;

        if !subscription.is_orphan() {
            warn!(
                source = "manual-pairing",
                subscription_id,
                order_id,
                actor_id,
                "Rejected pairing of a subscription that is not orphaned"
            );
            return Err(PairingError::InvalidState(format!(
                "Subscription #{} is not orphaned and cannot be paired",
                subscription_id
            )));
        }

        let Some(customer_id) = order.customer_id else {
            return Err(PairingError::InvalidState(format!(
                "Order #{} has no customer",
                order_id
            )));
        };

        let mut paired = subscription;
        paired.parent_id = Some(order_id);
        paired.customer_id = Some(customer_id);
        paired.status = SubscriptionStatus::Active;

        self.subscriptions
            .save_subscription(&paired)
            .await
            .map_err(|e| {
                internal(
                    "Failed to persist pairing",
                    subscription_id,
                    order_id,
                    actor_id,
                    e,
                )
            })?;

        let entry = RepairAuditEntry::manual_pairing(order_id, customer_id, actor_id);
        if let Err(e) = self.subscriptions.add_note(subscription_id, &entry).await {
            error!(
                source = "manual-pairing",
                subscription_id,
                order_id,
                actor_id,
                error = %e,
                "Pairing persisted but audit note could not be written"
            );
        }

        let entitlement_triggered = match &self.entitlements {
            None => false,
            Some(connector) => match trigger_once(connector.as_ref(), order_id).await {
                Ok(triggered) => triggered,
                Err(e) => {
                    error!(
                        source = "manual-pairing",
                        subscription_id,
                        order_id,
                        actor_id,
                        error = %e,
                        "Pairing persisted but entitlement trigger failed"
                    );
                    false
                }
            },
        };

        info!(
            source = "manual-pairing",
            subscription_id,
            parent_order_id = order_id,
            customer_id,
            actor_id,
            entitlement_triggered,
            "Subscription manually paired"
        );

        Ok(PairingReceipt {
            subscription_id,
            order_id,
            customer_id,
            status: paired.status,
            entitlement_triggered,
        })
    }

    async fn authorize(&self, actor_id: i64, nonce: &str) -> Result<(), PairingError> {
        let capable = self
            .authorizer
            .has_capability(actor_id)
            .await
            .map_err(|e| internal("Capability check failed", 0, 0, actor_id, e))?;
        if !capable {
            return Err(PairingError::Unauthorized(
                "User may not manage subscriptions".to_string(),
            ));
        }

        let consumed = self
            .authorizer
            .consume_nonce(actor_id, nonce)
            .await
            .map_err(|e| internal("Nonce check failed", 0, 0, actor_id, e))?;
        if !consumed {
            return Err(PairingError::Unauthorized(
                "Invalid or expired security token".to_string(),
            ));
        }
        Ok(())
    }
}

fn internal(
    context: &str,
    subscription_id: i64,
    order_id: i64,
    actor_id: i64,
    e: relink_common::Error,
) -> PairingError {
    error!(
        source = "manual-pairing",
        subscription_id,
        order_id,
        actor_id,
        error = %e,
        "{}",
        context
    );
    PairingError::Internal(format!("{}: {}", context, e))
}
