//! Engine facade
//!
//! One `RepairEngine` is built at process start and shared by whatever
//! dispatches order-processing events. Automated entry points never return
//! an error: failures are logged and the event's workflow continues.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use relink_common::LinkEvent;

use crate::backstop::{LifecycleBackstop, SweepReport};
use crate::error::PairingError;
use crate::hooks::{InterceptorChain, WriteInterceptor};
use crate::model::{
    DependentRecord, OrderStatus, ParentRecord, RecurringSchedule, RepairOutcome,
};
use crate::normalizer::RowNormalizer;
use crate::orphan::{OrphanMatcher, DEFAULT_MATCH_WINDOW_SECS};
use crate::pairing::{PairingReceipt, PairingRequest, PairingService};
use crate::payload::{CandidateRecord, SaveContext, WritePayload};
use crate::resolver::ReferenceResolver;
use crate::store::{
    EntitlementConnector, HierarchyStore, OrderStore, PairingAuthorizer, SubscriptionStore,
};
use crate::verifier::PostCreateVerifier;

/// Repositories the engine reads and writes
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub hierarchy: Arc<dyn HierarchyStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub match_window: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            match_window: chrono::Duration::seconds(DEFAULT_MATCH_WINDOW_SECS),
        }
    }
}

/// An orphan with the order it most likely belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanSuggestion {
    pub subscription: DependentRecord,
    pub suggested_order: Option<ParentRecord>,
}

pub struct RepairEngine {
    stores: Stores,
    chain: InterceptorChain,
    verifier: PostCreateVerifier,
    backstop: LifecycleBackstop,
    matcher: OrphanMatcher,
    pairing: PairingService,
    has_connector: bool,
}

impl RepairEngine {
    /// Wire every layer; the Row Normalizer is registered on the chain
    ///
    /// `entitlements` is checked once here; `None` disables only the
    /// entitlement step.
    pub fn new(
        stores: Stores,
        authorizer: Arc<dyn PairingAuthorizer>,
        entitlements: Option<Arc<dyn EntitlementConnector>>,
        settings: EngineSettings,
    ) -> Self {
        let resolver = ReferenceResolver::new(stores.orders.clone(), stores.hierarchy.clone());

        let mut chain = InterceptorChain::new();
        chain.register(Arc::new(RowNormalizer::new(resolver.clone())));

        let verifier = PostCreateVerifier::new(resolver.clone(), stores.subscriptions.clone());
        let backstop = LifecycleBackstop::new(
            resolver,
            stores.hierarchy.clone(),
            stores.subscriptions.clone(),
            entitlements.clone(),
        );
        let matcher = OrphanMatcher::with_window(stores.orders.clone(), settings.match_window);
        let pairing = PairingService::new(
            stores.orders.clone(),
            stores.subscriptions.clone(),
            entitlements.clone(),
            authorizer,
        );

        if entitlements.is_none() {
            warn!("No entitlement connector configured; entitlement triggers disabled");
        }

        Self {
            stores,
            chain,
            verifier,
            backstop,
            matcher,
            pairing,
            has_connector: entitlements.is_some(),
        }
    }

    /// Add a host interceptor; it runs before the Row Normalizer
    pub fn register_interceptor(&mut self, interceptor: Arc<dyn WriteInterceptor>) {
        self.chain.register(interceptor);
    }

    pub fn interceptor_order(&self) -> Vec<&'static str> {
        self.chain.order()
    }

    pub fn has_entitlement_connector(&self) -> bool {
        self.has_connector
    }

    /// Pre-write hook
    pub async fn before_write(
        &self,
        payload: WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> WritePayload {
        self.chain.apply(payload, candidate, context).await
    }

    /// Post-create hook
    pub async fn after_subscription_created(
        &self,
        subscription: &mut DependentRecord,
        order: &ParentRecord,
        schedule: &RecurringSchedule,
    ) -> RepairOutcome {
        match self.verifier.verify(subscription, order, schedule).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    source = "post-create-verifier",
                    subscription_id = subscription.id,
                    parent_order_id = order.id,
                    error = %e,
                    "Post-create verification failed, record left as is"
                );
                RepairOutcome::Unchanged
            }
        }
    }

    /// Status-transition hook; sweeps only when `status` is paid
    pub async fn on_order_status_changed(
        &self,
        order_id: i64,
        status: &OrderStatus,
    ) -> Option<SweepReport> {
        if !LifecycleBackstop::triggers_on(status) {
            debug!(order_id, status = %status, "Status does not trigger a sweep");
            return None;
        }

        match self.backstop.sweep(order_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(
                    source = "completion-backstop",
                    order_id,
                    error = %e,
                    "Completion sweep aborted"
                );
                None
            }
        }
    }

    /// Dispatch a [`LinkEvent`] to the matching hook
    pub async fn handle_event(&self, event: &LinkEvent) {
        match event {
            LinkEvent::SubscriptionCreated {
                subscription_id,
                order_id,
                ..
            } => {
                self.verify_created(*subscription_id, *order_id, &RecurringSchedule::default())
                    .await;
            }
            LinkEvent::OrderStatusChanged {
                order_id,
                new_status,
                ..
            } => {
                self.on_order_status_changed(*order_id, &OrderStatus::from_slug(new_status))
                    .await;
            }
        }
    }

    /// Load both records by id, then run the post-create hook
    pub async fn verify_created(
        &self,
        subscription_id: i64,
        order_id: i64,
        schedule: &RecurringSchedule,
    ) -> RepairOutcome {
        let subscription = self.stores.subscriptions.find_subscription(subscription_id).await;
        let order = self.stores.orders.find_order(order_id).await;

        match (subscription, order) {
            (Ok(Some(mut subscription)), Ok(Some(order))) => {
                self.after_subscription_created(&mut subscription, &order, schedule)
                    .await
            }
            (Ok(None), _) | (_, Ok(None)) => {
                debug!(
                    subscription_id,
                    order_id, "Created event refers to unknown records, skipping"
                );
                RepairOutcome::Unchanged
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    source = "post-create-verifier",
                    subscription_id,
                    parent_order_id = order_id,
                    error = %e,
                    "Could not load records for post-create verification"
                );
                RepairOutcome::Unchanged
            }
        }
    }

    /// Suggested order for one orphan
    pub async fn suggest_match(&self, orphan: &DependentRecord) -> Option<ParentRecord> {
        match self.matcher.find_match(orphan).await {
            Ok(found) => found,
            Err(e) => {
                warn!(subscription_id = orphan.id, error = %e, "Orphan match lookup failed");
                None
            }
        }
    }

    /// Oldest orphans first, each with its suggested order
    pub async fn list_orphans_with_suggestions(
        &self,
        limit: u32,
    ) -> relink_common::Result<Vec<OrphanSuggestion>> {
        let orphans = self.stores.subscriptions.list_orphans(limit).await?;
        let mut out = Vec::with_capacity(orphans.len());
        for subscription in orphans {
            let suggested_order = self.suggest_match(&subscription).await;
            out.push(OrphanSuggestion {
                subscription,
                suggested_order,
            });
        }
        Ok(out)
    }

    /// Manual pairing; the only entry point that reports failure
    pub async fn pair(
        &self,
        actor_id: i64,
        nonce: &str,
        request: PairingRequest,
    ) -> Result<PairingReceipt, PairingError> {
        let result = self.pairing.pair(actor_id, nonce, request).await;
        if let Err(e) = &result {
            debug!(
                subscription_id = request.subscription_id,
                order_id = request.order_id,
                actor_id,
                code = e.status_code(),
                "Manual pairing rejected"
            );
        }
        result
    }
}
