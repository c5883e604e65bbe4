//! Domain records the engine reads and repairs
//!
//! Identifiers are positive integers. Stores persist an empty reference as 0;
//! in memory an empty reference is `None`, converted at the store boundary
//! with [`non_empty`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert a stored id column to an optional reference (0 and negatives are empty)
pub fn non_empty(id: i64) -> Option<i64> {
    (id > 0).then_some(id)
}

/// Convert an optional reference back to its stored form
pub fn stored_id(id: Option<i64>) -> i64 {
    id.unwrap_or(0)
}

// ========================================
// Orders (parent records)
// ========================================

/// Order status as stored by the order-processing subsystem
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    Other(String),
}

impl OrderStatus {
    /// Statuses meaning the order has been paid
    pub const PAID: [OrderStatus; 2] = [OrderStatus::Processing, OrderStatus::Completed];

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
            OrderStatus::Other(slug) => slug,
        }
    }

    /// Parse a status slug; a leading `wc-` prefix is accepted
    pub fn from_slug(slug: &str) -> Self {
        let slug = slug.trim();
        let slug = slug.strip_prefix("wc-").unwrap_or(slug);
        match slug {
            "pending" => OrderStatus::Pending,
            "processing" => OrderStatus::Processing,
            "on-hold" => OrderStatus::OnHold,
            "completed" => OrderStatus::Completed,
            "cancelled" => OrderStatus::Cancelled,
            "refunded" => OrderStatus::Refunded,
            "failed" => OrderStatus::Failed,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// Terminal "paid" status
    pub fn is_paid(&self) -> bool {
        Self::PAID.contains(self)
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        OrderStatus::from_slug(&value)
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of row the orders table holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Order,
    Refund,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Order => "order",
            OrderKind::Refund => "refund",
        }
    }

    /// Unknown kinds are never eligible for matching, so they map to Refund
    pub fn from_slug(slug: &str) -> Self {
        match slug {
            "order" => OrderKind::Order,
            _ => OrderKind::Refund,
        }
    }
}

/// Parent record (an order). Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRecord {
    pub id: i64,
    pub kind: OrderKind,
    pub status: OrderStatus,
    /// Owning customer
    pub customer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ========================================
// Subscriptions (dependent records)
// ========================================

/// Subscription status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    OnHold,
    Cancelled,
    PendingCancel,
    Expired,
    Other(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::OnHold => "on-hold",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PendingCancel => "pending-cancel",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Other(slug) => slug,
        }
    }

    pub fn from_slug(slug: &str) -> Self {
        let slug = slug.trim();
        let slug = slug.strip_prefix("wc-").unwrap_or(slug);
        match slug {
            "pending" => SubscriptionStatus::Pending,
            "active" => SubscriptionStatus::Active,
            "on-hold" => SubscriptionStatus::OnHold,
            "cancelled" => SubscriptionStatus::Cancelled,
            "pending-cancel" => SubscriptionStatus::PendingCancel,
            "expired" => SubscriptionStatus::Expired,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        SubscriptionStatus::from_slug(&value)
    }
}

impl From<SubscriptionStatus> for String {
    fn from(value: SubscriptionStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependent record (a subscription) as held in the authoritative store
///
/// The looser secondary parent pointer is not part of this struct; it is
/// owned by the content hierarchy and read through
/// [`HierarchyStore`](crate::store::HierarchyStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentRecord {
    pub id: i64,
    /// Originating order
    pub parent_id: Option<i64>,
    /// Owning customer
    pub customer_id: Option<i64>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl DependentRecord {
    /// Both references empty: eligible for manual pairing, and only then
    pub fn is_orphan(&self) -> bool {
        self.parent_id.is_none() && self.customer_id.is_none()
    }
}

/// Billing schedule supplied with the post-create event
///
/// Carried for the event contract only; no repair decision reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    #[serde(default)]
    pub billing_period: Option<String>,
    #[serde(default)]
    pub billing_interval: Option<u32>,
    #[serde(default)]
    pub next_payment: Option<DateTime<Utc>>,
}

// ========================================
// Audit
// ========================================

/// Repair layer that produced an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairLayer {
    CheckoutOrigin,
    CompletionBackstop,
    ManualPairing,
}

impl RepairLayer {
    pub fn tag(&self) -> &'static str {
        match self {
            RepairLayer::CheckoutOrigin => "checkout-origin",
            RepairLayer::CompletionBackstop => "completion-backstop",
            RepairLayer::ManualPairing => "manual-pairing",
        }
    }
}

impl fmt::Display for RepairLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Version tag stamped on every audit entry
pub const AUDIT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Immutable operator-facing note attached to a subscription
///
/// Written by the engine, never read back by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAuditEntry {
    pub layer: RepairLayer,
    pub parent_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub version: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl RepairAuditEntry {
    /// Entry for an automated repair
    pub fn repair(layer: RepairLayer, parent_id: Option<i64>, customer_id: Option<i64>) -> Self {
        let message = format!(
            "[relink {}] {} repair: parent order #{}, customer #{}",
            AUDIT_VERSION,
            layer.tag(),
            stored_id(parent_id),
            stored_id(customer_id)
        );
        Self {
            layer,
            parent_id,
            customer_id,
            version: AUDIT_VERSION.to_string(),
            message,
            created_at: Utc::now(),
        }
    }

    /// Human-readable entry for a manual pairing
    pub fn manual_pairing(order_id: i64, customer_id: i64, actor_id: i64) -> Self {
        let message = format!(
            "Subscription manually linked to order #{} (customer #{}) by user #{}",
            order_id, customer_id, actor_id
        );
        Self {
            layer: RepairLayer::ManualPairing,
            parent_id: Some(order_id),
            customer_id: Some(customer_id),
            version: AUDIT_VERSION.to_string(),
            message,
            created_at: Utc::now(),
        }
    }
}

/// Result of a single-record repair attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Record already matched; nothing persisted, nothing audited
    Unchanged,
    /// Record was updated and persisted
    Repaired {
        parent_id: Option<i64>,
        customer_id: Option<i64>,
    },
}

impl RepairOutcome {
    pub fn is_repaired(&self) -> bool {
        matches!(self, RepairOutcome::Repaired { .. })
    }
}
