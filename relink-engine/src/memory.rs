//! In-memory stores and collaborators
//!
//! Substitutes for the sqlite stores and the HTTP connector in tests. Orders
//! iterate in id order, which is their natural order here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relink_common::{time::from_unix, Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::model::{
    DependentRecord, OrderKind, OrderStatus, ParentRecord, RepairAuditEntry, SubscriptionStatus,
};
use crate::store::{
    EntitlementConnector, HierarchyStore, OrderStore, PairingAuthorizer, SubscriptionStore,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct State {
    orders: BTreeMap<i64, ParentRecord>,
    subscriptions: BTreeMap<i64, DependentRecord>,
    hierarchy: BTreeMap<i64, i64>,
    notes: BTreeMap<i64, Vec<RepairAuditEntry>>,
    saves: usize,
    fail_reads: bool,
    fail_saves: BTreeSet<i64>,
}

/// Orders, subscriptions and the content hierarchy in one place
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a regular order created at Unix second `created_at`
    pub fn insert_order(
        &self,
        id: i64,
        status: OrderStatus,
        customer_id: Option<i64>,
        created_at: i64,
    ) {
        self.insert_order_record(ParentRecord {
            id,
            kind: OrderKind::Order,
            status,
            customer_id,
            created_at: from_unix(created_at),
        });
    }

    pub fn insert_order_record(&self, order: ParentRecord) {
        lock(&self.state).orders.insert(order.id, order);
    }

    /// Insert a pending subscription created at Unix second `created_at`
    pub fn insert_subscription(
        &self,
        id: i64,
        parent_id: Option<i64>,
        customer_id: Option<i64>,
        created_at: i64,
    ) {
        lock(&self.state).subscriptions.insert(
            id,
            DependentRecord {
                id,
                parent_id,
                customer_id,
                status: SubscriptionStatus::Pending,
                created_at: from_unix(created_at),
            },
        );
    }

    pub fn set_secondary_parent(&self, record_id: i64, parent_id: i64) {
        lock(&self.state).hierarchy.insert(record_id, parent_id);
    }

    pub fn subscription(&self, id: i64) -> Option<DependentRecord> {
        lock(&self.state).subscriptions.get(&id).cloned()
    }

    pub fn notes(&self, subscription_id: i64) -> Vec<RepairAuditEntry> {
        lock(&self.state)
            .notes
            .get(&subscription_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful `save_subscription` and `update_references` calls
    pub fn save_count(&self) -> usize {
        lock(&self.state).saves
    }

    /// Make every read fail
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make every write to one subscription fail
    pub fn fail_saves_for(&self, subscription_id: i64) {
        lock(&self.state).fail_saves.insert(subscription_id);
    }

    fn check_reads(state: &State) -> Result<()> {
        if state.fail_reads {
            return Err(Error::Internal("simulated read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order(&self, order_id: i64) -> Result<Option<ParentRecord>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn orders_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ParentRecord>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.created_at >= from && o.created_at <= to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    async fn secondary_parent(&self, record_id: i64) -> Result<Option<i64>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        Ok(state.hierarchy.get(&record_id).copied())
    }

    async fn children_of(&self, parent_id: i64) -> Result<Vec<i64>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        Ok(state
            .hierarchy
            .iter()
            .filter(|(_, parent)| **parent == parent_id)
            .map(|(child, _)| *child)
            .collect())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_subscription(&self, subscription_id: i64) -> Result<Option<DependentRecord>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        Ok(state.subscriptions.get(&subscription_id).cloned())
    }

    async fn save_subscription(&self, subscription: &DependentRecord) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_saves.contains(&subscription.id) {
            return Err(Error::Internal(format!(
                "simulated save failure for subscription {}",
                subscription.id
            )));
        }
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        state.saves += 1;
        Ok(())
    }

    async fn update_references(
        &self,
        subscription_id: i64,
        parent_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_saves.contains(&subscription_id) {
            return Err(Error::Internal(format!(
                "simulated save failure for subscription {}",
                subscription_id
            )));
        }
        let Some(subscription) = state.subscriptions.get_mut(&subscription_id) else {
            return Err(Error::NotFound(format!(
                "Subscription {} not found",
                subscription_id
            )));
        };
        subscription.parent_id = parent_id;
        subscription.customer_id = customer_id;
        state.saves += 1;
        Ok(())
    }

    async fn add_note(&self, subscription_id: i64, entry: &RepairAuditEntry) -> Result<()> {
        lock(&self.state)
            .notes
            .entry(subscription_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_orphans(&self, limit: u32) -> Result<Vec<DependentRecord>> {
        let state = lock(&self.state);
        Self::check_reads(&state)?;
        let mut orphans: Vec<DependentRecord> = state
            .subscriptions
            .values()
            .filter(|s| s.is_orphan())
            .cloned()
            .collect();
        orphans.sort_by_key(|s| (s.created_at, s.id));
        orphans.truncate(limit as usize);
        Ok(orphans)
    }
}

/// Entitlement connector recording every call
#[derive(Default)]
pub struct MemoryEntitlements {
    issued: Mutex<BTreeSet<i64>>,
    update_calls: Mutex<Vec<i64>>,
    fail_updates: Mutex<bool>,
}

impl MemoryEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an entitlement was issued earlier
    pub fn with_existing(self, order_id: i64) -> Self {
        lock(&self.issued).insert(order_id);
        self
    }

    pub fn fail_updates(&self, fail: bool) {
        *lock(&self.fail_updates) = fail;
    }

    /// Order ids passed to `update`, in call order
    pub fn update_calls(&self) -> Vec<i64> {
        lock(&self.update_calls).clone()
    }
}

#[async_trait]
impl EntitlementConnector for MemoryEntitlements {
    async fn exists(&self, order_id: i64) -> Result<bool> {
        Ok(lock(&self.issued).contains(&order_id))
    }

    async fn update(&self, order_id: i64) -> Result<()> {
        lock(&self.update_calls).push(order_id);
        if *lock(&self.fail_updates) {
            return Err(Error::Internal("simulated connector failure".to_string()));
        }
        lock(&self.issued).insert(order_id);
        Ok(())
    }
}

/// Authorizer backed by an explicit capability list and nonce table
#[derive(Default)]
pub struct MemoryAuthorizer {
    capable: Mutex<BTreeSet<i64>>,
    nonces: Mutex<HashMap<String, i64>>,
}

impl MemoryAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: i64) {
        lock(&self.capable).insert(user_id);
    }

    pub fn issue_nonce(&self, user_id: i64, nonce: &str) {
        lock(&self.nonces).insert(nonce.to_string(), user_id);
    }
}

#[async_trait]
impl PairingAuthorizer for MemoryAuthorizer {
    async fn has_capability(&self, user_id: i64) -> Result<bool> {
        Ok(lock(&self.capable).contains(&user_id))
    }

    async fn consume_nonce(&self, user_id: i64, nonce: &str) -> Result<bool> {
        let mut nonces = lock(&self.nonces);
        match nonces.get(nonce) {
            Some(owner) if *owner == user_id => {
                nonces.remove(nonce);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
