//! sqlite store tests against a real database file

use async_trait::async_trait;
use relink_common::db::init_database;
use relink_engine::memory::{MemoryAuthorizer, MemoryEntitlements};
use relink_engine::model::{
    DependentRecord, OrderKind, OrderStatus, RecurringSchedule, RepairAuditEntry, RepairLayer,
    RepairOutcome, SubscriptionStatus,
};
use relink_engine::sqlite::{sqlite_stores, SqliteAuthorizer, SqliteSubscriptionStore};
use relink_engine::store::{EntitlementConnector, PairingAuthorizer, SubscriptionStore};
use relink_engine::{EngineSettings, PairingRequest, RepairEngine, Stores};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

const T: i64 = 1_700_000_000;

async fn setup() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("relink.db")).await.unwrap();
    (dir, pool)
}

async fn insert_order(
    pool: &SqlitePool,
    id: i64,
    kind: &str,
    status: &str,
    customer: i64,
    created: i64,
) {
    sqlx::query(
        "INSERT INTO orders (id, kind, status, customer_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(kind)
    .bind(status)
    .bind(customer)
    .bind(created)
    .execute(pool)
    .await
    .unwrap();
}

async fn insert_subscription(
    pool: &SqlitePool,
    id: i64,
    parent: i64,
    customer: i64,
    created: i64,
) {
    sqlx::query(
        "INSERT INTO subscriptions (id, parent_order_id, customer_id, status, created_at) VALUES (?, ?, ?, 'pending', ?)",
    )
    .bind(id)
    .bind(parent)
    .bind(customer)
    .bind(created)
    .execute(pool)
    .await
    .unwrap();
}

async fn set_secondary_parent(pool: &SqlitePool, record: i64, parent: i64) {
    sqlx::query("INSERT INTO content_hierarchy (record_id, parent_id) VALUES (?, ?)")
        .bind(record)
        .bind(parent)
        .execute(pool)
        .await
        .unwrap();
}

async fn insert_user(pool: &SqlitePool, id: i64, can_manage: bool) {
    sqlx::query("INSERT INTO users (id, username, manage_subscriptions) VALUES (?, ?, ?)")
        .bind(id)
        .bind(format!("user{}", id))
        .bind(can_manage as i64)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_zero_columns_read_as_empty() {
    let (_dir, pool) = setup().await;
    insert_order(&pool, 500, "order", "wc-completed", 0, T).await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    set_secondary_parent(&pool, 902, 0).await;
    let stores = sqlite_stores(&pool);

    let order = stores.orders.find_order(500).await.unwrap().unwrap();
    assert_eq!(order.customer_id, None);
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.kind, OrderKind::Order);

    let sub = stores
        .subscriptions
        .find_subscription(901)
        .await
        .unwrap()
        .unwrap();
    assert!(sub.is_orphan());
    assert_eq!(sub.status, SubscriptionStatus::Pending);

    assert_eq!(stores.hierarchy.secondary_parent(902).await.unwrap(), None);
    assert_eq!(stores.hierarchy.secondary_parent(903).await.unwrap(), None);
    assert!(stores.orders.find_order(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_and_note_round_through_store() {
    let (_dir, pool) = setup().await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    let stores = sqlite_stores(&pool);

    let mut sub = stores
        .subscriptions
        .find_subscription(901)
        .await
        .unwrap()
        .unwrap();
    sub.parent_id = Some(500);
    sub.customer_id = Some(42);
    sub.status = SubscriptionStatus::Active;
    stores.subscriptions.save_subscription(&sub).await.unwrap();

    let entry = RepairAuditEntry::repair(RepairLayer::CompletionBackstop, Some(500), Some(42));
    stores.subscriptions.add_note(901, &entry).await.unwrap();

    let row: (i64, i64, String) = sqlx::query_as(
        "SELECT parent_order_id, customer_id, status FROM subscriptions WHERE id = 901",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row, (500, 42, "active".to_string()));

    let (layer, version): (String, String) =
        sqlx::query_as("SELECT layer, version FROM subscription_notes WHERE subscription_id = 901")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(layer, "completion-backstop");
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_save_of_missing_subscription_fails() {
    let (_dir, pool) = setup().await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    let stores = sqlite_stores(&pool);

    let mut sub = stores
        .subscriptions
        .find_subscription(901)
        .await
        .unwrap()
        .unwrap();
    sub.id = 999;

    assert!(stores.subscriptions.save_subscription(&sub).await.is_err());
    assert!(stores
        .subscriptions
        .update_references(999, Some(500), Some(42))
        .await
        .is_err());
}

async fn subscription_row(pool: &SqlitePool, id: i64) -> (i64, i64, String) {
    sqlx::query_as("SELECT parent_order_id, customer_id, status FROM subscriptions WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_update_references_leaves_status_alone() {
    let (_dir, pool) = setup().await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    sqlx::query("UPDATE subscriptions SET status = 'on-hold' WHERE id = 901")
        .execute(&pool)
        .await
        .unwrap();
    let stores = sqlite_stores(&pool);

    stores
        .subscriptions
        .update_references(901, Some(500), None)
        .await
        .unwrap();

    assert_eq!(
        subscription_row(&pool, 901).await,
        (500, 0, "on-hold".to_string())
    );
}

/// Activates the subscription in the database right after every read, the
/// way a concurrent lifecycle handler would
struct ActivatingSubscriptions {
    inner: SqliteSubscriptionStore,
    pool: SqlitePool,
}

#[async_trait]
impl SubscriptionStore for ActivatingSubscriptions {
    async fn find_subscription(
        &self,
        subscription_id: i64,
    ) -> relink_common::Result<Option<DependentRecord>> {
        let found = self.inner.find_subscription(subscription_id).await?;
        sqlx::query("UPDATE subscriptions SET status = 'active' WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(found)
    }

    async fn save_subscription(&self, subscription: &DependentRecord) -> relink_common::Result<()> {
        self.inner.save_subscription(subscription).await
    }

    async fn update_references(
        &self,
        subscription_id: i64,
        parent_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> relink_common::Result<()> {
        self.inner
            .update_references(subscription_id, parent_id, customer_id)
            .await
    }

    async fn add_note(
        &self,
        subscription_id: i64,
        entry: &RepairAuditEntry,
    ) -> relink_common::Result<()> {
        self.inner.add_note(subscription_id, entry).await
    }

    async fn list_orphans(&self, limit: u32) -> relink_common::Result<Vec<DependentRecord>> {
        self.inner.list_orphans(limit).await
    }
}

fn engine_with_concurrent_activation(pool: &SqlitePool) -> RepairEngine {
    let stores = sqlite_stores(pool);
    let stores = Stores {
        subscriptions: Arc::new(ActivatingSubscriptions {
            inner: SqliteSubscriptionStore::new(pool.clone()),
            pool: pool.clone(),
        }),
        ..stores
    };
    RepairEngine::new(
        stores,
        Arc::new(MemoryAuthorizer::new()),
        None,
        EngineSettings::default(),
    )
}

#[tokio::test]
async fn test_backstop_keeps_status_changed_after_read() {
    let (_dir, pool) = setup().await;
    insert_order(&pool, 500, "order", "completed", 42, T).await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    set_secondary_parent(&pool, 901, 500).await;
    let engine = engine_with_concurrent_activation(&pool);

    let report = engine
        .on_order_status_changed(500, &OrderStatus::Completed)
        .await
        .unwrap();

    assert_eq!(report.repaired, vec![901]);
    assert_eq!(
        subscription_row(&pool, 901).await,
        (500, 42, "active".to_string())
    );
}

#[tokio::test]
async fn test_verifier_keeps_status_changed_after_read() {
    let (_dir, pool) = setup().await;
    insert_order(&pool, 500, "order", "processing", 42, T).await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    let engine = engine_with_concurrent_activation(&pool);

    let outcome = engine
        .verify_created(901, 500, &RecurringSchedule::default())
        .await;

    assert!(matches!(outcome, RepairOutcome::Repaired { .. }));
    assert_eq!(
        subscription_row(&pool, 901).await,
        (500, 42, "active".to_string())
    );
}

#[tokio::test]
async fn test_list_orphans_oldest_first() {
    let (_dir, pool) = setup().await;
    insert_subscription(&pool, 903, 0, 0, T + 20).await;
    insert_subscription(&pool, 901, 0, 0, T).await;
    insert_subscription(&pool, 902, 500, 0, T + 10).await;
    insert_subscription(&pool, 904, 0, 0, T + 30).await;
    let stores = sqlite_stores(&pool);

    let orphans = stores.subscriptions.list_orphans(2).await.unwrap();
    let ids: Vec<i64> = orphans.iter().map(|s| s.id).collect();

    assert_eq!(ids, vec![901, 903]);
}

#[tokio::test]
async fn test_orders_created_between_and_children() {
    let (_dir, pool) = setup().await;
    insert_order(&pool, 1, "order", "completed", 42, T - 90).await;
    insert_order(&pool, 2, "refund", "completed", 42, T - 10).await;
    insert_order(&pool, 3, "order", "processing", 43, T + 10).await;
    set_secondary_parent(&pool, 901, 3).await;
    set_secondary_parent(&pool, 902, 3).await;
    let stores = sqlite_stores(&pool);

    let orders = stores
        .orders
        .orders_created_between(
            relink_common::time::from_unix(T - 60),
            relink_common::time::from_unix(T + 60),
        )
        .await
        .unwrap();
    let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(orders[0].kind, OrderKind::Refund);

    assert_eq!(stores.hierarchy.children_of(3).await.unwrap(), vec![901, 902]);
    assert!(stores.hierarchy.children_of(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nonce_lifecycle() {
    let (_dir, pool) = setup().await;
    insert_user(&pool, 1, true).await;
    insert_user(&pool, 2, false).await;
    let authorizer = SqliteAuthorizer::new(pool.clone(), 86_400);

    assert!(authorizer.has_capability(1).await.unwrap());
    assert!(!authorizer.has_capability(2).await.unwrap());
    assert!(!authorizer.has_capability(3).await.unwrap());
    assert!(authorizer.issue_nonce(2).await.is_err());

    let nonce = authorizer.issue_nonce(1).await.unwrap();
    assert!(!authorizer.consume_nonce(2, &nonce).await.unwrap());
    assert!(authorizer.consume_nonce(1, &nonce).await.unwrap());
    assert!(!authorizer.consume_nonce(1, &nonce).await.unwrap());

    assert_eq!(authorizer.purge_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn test_expired_nonce_rejected() {
    let (_dir, pool) = setup().await;
    insert_user(&pool, 1, true).await;
    sqlx::query("INSERT INTO pairing_nonces (nonce, user_id, issued_at) VALUES ('old', 1, ?)")
        .bind(T)
        .execute(&pool)
        .await
        .unwrap();
    let authorizer = SqliteAuthorizer::new(pool.clone(), 60);

    assert!(!authorizer.consume_nonce(1, "old").await.unwrap());
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let (_dir, pool) = setup().await;
    insert_order(&pool, 500, "order", "completed", 42, T).await;
    insert_subscription(&pool, 901, 0, 42, T).await;
    insert_subscription(&pool, 902, 0, 0, T + 5).await;
    set_secondary_parent(&pool, 901, 500).await;
    insert_user(&pool, 1, true).await;

    let entitlements = Arc::new(MemoryEntitlements::new());
    let authorizer = Arc::new(SqliteAuthorizer::new(pool.clone(), 86_400));
    let engine = RepairEngine::new(
        sqlite_stores(&pool),
        authorizer.clone(),
        Some(entitlements.clone() as Arc<dyn EntitlementConnector>),
        EngineSettings::default(),
    );

    let report = engine
        .on_order_status_changed(500, &OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(report.repaired, vec![901]);

    let suggestions = engine.list_orphans_with_suggestions(10).await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(
        suggestions[0].suggested_order.as_ref().map(|o| o.id),
        Some(500)
    );

    let nonce = authorizer.issue_nonce(1).await.unwrap();
    let receipt = engine
        .pair(
            1,
            &nonce,
            PairingRequest {
                subscription_id: 902,
                order_id: 500,
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.customer_id, 42);
    assert!(!receipt.entitlement_triggered);
    assert_eq!(entitlements.update_calls(), vec![500]);

    let notes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscription_notes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(notes, 2);
}
