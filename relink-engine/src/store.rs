//! Repository and collaborator contracts
//!
//! The engine depends only on these traits. `sqlite` provides the production
//! implementations, `memory` the in-process fakes used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relink_common::Result;

use crate::model::{DependentRecord, ParentRecord, RepairAuditEntry};

/// Authoritative order store (read-only)
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, order_id: i64) -> Result<Option<ParentRecord>>;

    /// Every order row created inside `[from, to]`, in the store's natural order
    async fn orders_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ParentRecord>>;
}

/// Platform content hierarchy holding the secondary parent pointer (read-only)
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Secondary parent of a record; `None` when unset or unknown
    async fn secondary_parent(&self, record_id: i64) -> Result<Option<i64>>;

    /// Records whose secondary pointer references `parent_id`
    async fn children_of(&self, parent_id: i64) -> Result<Vec<i64>>;
}

/// Authoritative subscription store
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_subscription(&self, subscription_id: i64) -> Result<Option<DependentRecord>>;

    /// Persist references and status (last writer wins)
    async fn save_subscription(&self, subscription: &DependentRecord) -> Result<()>;

    /// Persist the parent and owner references only; status is left untouched
    async fn update_references(
        &self,
        subscription_id: i64,
        parent_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> Result<()>;

    async fn add_note(&self, subscription_id: i64, entry: &RepairAuditEntry) -> Result<()>;

    /// Subscriptions with neither parent nor owner, oldest first
    async fn list_orphans(&self, limit: u32) -> Result<Vec<DependentRecord>>;
}

/// Downstream entitlement (license) service
#[async_trait]
pub trait EntitlementConnector: Send + Sync {
    /// Whether an entitlement has already been issued for the order
    async fn exists(&self, order_id: i64) -> Result<bool>;

    /// Issue or refresh the entitlement for the order
    async fn update(&self, order_id: i64) -> Result<()>;
}

/// Entry guard for manual pairing
#[async_trait]
pub trait PairingAuthorizer: Send + Sync {
    /// Whether the user may manage subscriptions
    async fn has_capability(&self, user_id: i64) -> Result<bool>;

    /// Consume a single-use anti-replay token; false if unknown, expired,
    /// already used, or issued to someone else
    async fn consume_nonce(&self, user_id: i64, nonce: &str) -> Result<bool>;
}
