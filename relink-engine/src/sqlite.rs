//! sqlite-backed stores
//!
//! Reference columns hold 0 for "empty"; rows are converted to `Option`
//! here so no sentinel leaks into the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relink_common::{api::generate_nonce, time, Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::engine::Stores;
use crate::model::{
    non_empty, stored_id, DependentRecord, OrderKind, OrderStatus, ParentRecord,
    RepairAuditEntry, SubscriptionStatus,
};
use crate::store::{HierarchyStore, OrderStore, PairingAuthorizer, SubscriptionStore};

/// Build the engine's stores over one pool
pub fn sqlite_stores(pool: &SqlitePool) -> Stores {
    Stores {
        orders: Arc::new(SqliteOrderStore::new(pool.clone())),
        hierarchy: Arc::new(SqliteHierarchyStore::new(pool.clone())),
        subscriptions: Arc::new(SqliteSubscriptionStore::new(pool.clone())),
    }
}

fn order_from_row(row: &SqliteRow) -> Result<ParentRecord> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(ParentRecord {
        id: row.try_get("id")?,
        kind: OrderKind::from_slug(&kind),
        status: OrderStatus::from_slug(&status),
        customer_id: non_empty(row.try_get("customer_id")?),
        created_at: time::from_unix(row.try_get("created_at")?),
    })
}

fn subscription_from_row(row: &SqliteRow) -> Result<DependentRecord> {
    let status: String = row.try_get("status")?;
    Ok(DependentRecord {
        id: row.try_get("id")?,
        parent_id: non_empty(row.try_get("parent_order_id")?),
        customer_id: non_empty(row.try_get("customer_id")?),
        status: SubscriptionStatus::from_slug(&status),
        created_at: time::from_unix(row.try_get("created_at")?),
    })
}

pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn find_order(&self, order_id: i64) -> Result<Option<ParentRecord>> {
        let row = sqlx::query(
            "SELECT id, kind, status, customer_id, created_at FROM orders WHERE id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn orders_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ParentRecord>> {
        // Second resolution in storage: widen to whole seconds, the matcher
        // applies the exact window
        let from_secs = from.timestamp();
        let to_secs = to.timestamp() + i64::from(to.timestamp_subsec_nanos() > 0);

        let rows = sqlx::query(
            r#"
            SELECT id, kind, status, customer_id, created_at
            FROM orders
            WHERE created_at BETWEEN ? AND ?
            ORDER BY id
            "#,
        )
        .bind(from_secs)
        .bind(to_secs)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }
}

pub struct SqliteHierarchyStore {
    pool: SqlitePool,
}

impl SqliteHierarchyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HierarchyStore for SqliteHierarchyStore {
    async fn secondary_parent(&self, record_id: i64) -> Result<Option<i64>> {
        let parent: Option<i64> =
            sqlx::query_scalar("SELECT parent_id FROM content_hierarchy WHERE record_id = ?")
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(parent.and_then(non_empty))
    }

    async fn children_of(&self, parent_id: i64) -> Result<Vec<i64>> {
        if non_empty(parent_id).is_none() {
            return Ok(Vec::new());
        }

        let children: Vec<i64> = sqlx::query_scalar(
            "SELECT record_id FROM content_hierarchy WHERE parent_id = ? ORDER BY record_id",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(children)
    }
}

pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn find_subscription(&self, subscription_id: i64) -> Result<Option<DependentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, parent_order_id, customer_id, status, created_at
            FROM subscriptions
            WHERE id = ?
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn save_subscription(&self, subscription: &DependentRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET parent_order_id = ?, customer_id = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(stored_id(subscription.parent_id))
        .bind(stored_id(subscription.customer_id))
        .bind(subscription.status.as_str())
        .bind(time::now().timestamp())
        .bind(subscription.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Subscription {} not found",
                subscription.id
            )));
        }
        Ok(())
    }

    async fn update_references(
        &self,
        subscription_id: i64,
        parent_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET parent_order_id = ?, customer_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(stored_id(parent_id))
        .bind(stored_id(customer_id))
        .bind(time::now().timestamp())
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Subscription {} not found",
                subscription_id
            )));
        }
        Ok(())
    }

    async fn add_note(&self, subscription_id: i64, entry: &RepairAuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_notes (
                subscription_id, layer, parent_order_id, customer_id,
                version, note, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscription_id)
        .bind(entry.layer.tag())
        .bind(entry.parent_id)
        .bind(entry.customer_id)
        .bind(&entry.version)
        .bind(&entry.message)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_orphans(&self, limit: u32) -> Result<Vec<DependentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_order_id, customer_id, status, created_at
            FROM subscriptions
            WHERE parent_order_id <= 0 AND customer_id <= 0
            ORDER BY created_at, id
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }
}

/// Capability flags from `users`, single-use tokens from `pairing_nonces`
pub struct SqliteAuthorizer {
    pool: SqlitePool,
    nonce_ttl_secs: i64,
}

impl SqliteAuthorizer {
    pub fn new(pool: SqlitePool, nonce_ttl_secs: i64) -> Self {
        Self {
            pool,
            nonce_ttl_secs,
        }
    }

    /// Issue a fresh token for a user holding the manage capability
    pub async fn issue_nonce(&self, user_id: i64) -> Result<String> {
        if !self.has_capability(user_id).await? {
            return Err(Error::InvalidInput(format!(
                "User {} may not manage subscriptions",
                user_id
            )));
        }

        let nonce = generate_nonce();
        sqlx::query("INSERT INTO pairing_nonces (nonce, user_id, issued_at) VALUES (?, ?, ?)")
            .bind(&nonce)
            .bind(user_id)
            .bind(time::now().timestamp())
            .execute(&self.pool)
            .await?;

        debug!(user_id, "Issued pairing nonce");
        Ok(nonce)
    }

    /// Drop tokens that are consumed or past their lifetime
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = time::now().timestamp() - self.nonce_ttl_secs;
        let result = sqlx::query(
            "DELETE FROM pairing_nonces WHERE consumed_at IS NOT NULL OR issued_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PairingAuthorizer for SqliteAuthorizer {
    async fn has_capability(&self, user_id: i64) -> Result<bool> {
        let flag: Option<i64> =
            sqlx::query_scalar("SELECT manage_subscriptions FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(flag.unwrap_or(0) != 0)
    }

    async fn consume_nonce(&self, user_id: i64, nonce: &str) -> Result<bool> {
        let now = time::now().timestamp();
        // Single statement: two concurrent consumers cannot both succeed
        let result = sqlx::query(
            r#"
            UPDATE pairing_nonces
            SET consumed_at = ?
            WHERE nonce = ? AND user_id = ? AND consumed_at IS NULL AND issued_at >= ?
            "#,
        )
        .bind(now)
        .bind(nonce)
        .bind(user_id)
        .bind(now - self.nonce_ttl_secs)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
