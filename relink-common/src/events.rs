//! Event types delivered by the order-processing system
//!
//! Whatever dispatch mechanism the host provides (HTTP hooks, a queue
//! consumer, an in-process bus) forwards these to a single engine instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events the repair engine reacts to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LinkEvent {
    /// A subscription was created by the checkout workflow
    ///
    /// Triggers:
    /// - Post-create verification of the new subscription
    SubscriptionCreated {
        subscription_id: i64,
        order_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// An order entered a new status
    ///
    /// Triggers:
    /// - Lifecycle backstop sweep, if the new status is a paid status
    OrderStatusChanged {
        order_id: i64,
        /// Status slug, e.g. "processing", "completed"
        new_status: String,
        timestamp: DateTime<Utc>,
    },
}

impl LinkEvent {
    /// Short name used in log lines
    pub fn event_type(&self) -> &'static str {
        match self {
            LinkEvent::SubscriptionCreated { .. } => "SubscriptionCreated",
            LinkEvent::OrderStatusChanged { .. } => "OrderStatusChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LinkEvent::OrderStatusChanged {
            order_id: 500,
            new_status: "completed".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderStatusChanged");
        assert_eq!(json["order_id"], 500);
        assert_eq!(json["new_status"], "completed");
    }

    #[test]
    fn test_event_deserializes_from_tagged_json() {
        let json = r#"{
            "type": "SubscriptionCreated",
            "subscription_id": 901,
            "order_id": 500,
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;

        let event: LinkEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "SubscriptionCreated");
        match event {
            LinkEvent::SubscriptionCreated {
                subscription_id,
                order_id,
                ..
            } => {
                assert_eq!(subscription_id, 901);
                assert_eq!(order_id, 500);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
