//! Entitlement trigger and the HTTP connector
//!
//! `trigger_once` checks for an existing entitlement before calling
//! `update`, so repeated paid-status events for one order issue at most one
//! entitlement. Two processes racing on the same order can both pass the
//! check; closing that window needs a uniqueness guarantee on the
//! entitlement service side.

use async_trait::async_trait;
use relink_common::{Error, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

use crate::store::EntitlementConnector;

/// What happened to the entitlement step of a sweep or pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementAction {
    /// No connector configured
    NoConnector,
    /// Entitlement already present; update not called
    AlreadyExists,
    /// Update called and succeeded
    Triggered,
    /// Existence check or update failed
    Failed,
}

/// Call `update` for `order_id` unless an entitlement already exists
///
/// Returns `Ok(true)` if `update` was invoked.
pub async fn trigger_once(connector: &dyn EntitlementConnector, order_id: i64) -> Result<bool> {
    if connector.exists(order_id).await? {
        debug!(order_id, "Entitlement already exists, skipping update");
        return Ok(false);
    }
    connector.update(order_id).await?;
    info!(order_id, "Entitlement update triggered");
    Ok(true)
}

/// Connector for an HTTP entitlement service
///
/// - `GET  {base}/entitlements/{order_id}`: 200 exists, 404 absent
/// - `POST {base}/entitlements/{order_id}`: issue or refresh
pub struct HttpEntitlementConnector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEntitlementConnector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build entitlement client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, order_id: i64) -> String {
        format!("{}/entitlements/{}", self.base_url, order_id)
    }
}

#[async_trait]
impl EntitlementConnector for HttpEntitlementConnector {
    async fn exists(&self, order_id: i64) -> Result<bool> {
        let response = self
            .client
            .get(self.url(order_id))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Entitlement lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Error::Internal(format!(
                "Entitlement lookup for order {} returned {}",
                order_id, status
            ))),
        }
    }

    async fn update(&self, order_id: i64) -> Result<()> {
        let response = self
            .client
            .post(self.url(order_id))
            .json(&serde_json::json!({ "order_id": order_id }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Entitlement update failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "Entitlement update for order {} returned {}",
                order_id,
                response.status()
            )));
        }
        Ok(())
    }
}
