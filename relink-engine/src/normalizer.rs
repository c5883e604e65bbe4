//! Row Normalizer
//!
//! Write-time layer. Fills the parent and owner columns of a new
//! subscription row when they are about to be committed at the empty
//! sentinel. Columns already holding a real value are never touched.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::hooks::{WriteInterceptor, LAST_PRIORITY};
use crate::payload::{
    CandidateRecord, RecordKind, SaveContext, WritePayload, CUSTOMER_FIELD, PARENT_FIELD,
    SUBSCRIPTIONS_TABLE,
};
use crate::resolver::ReferenceResolver;

pub struct RowNormalizer {
    resolver: ReferenceResolver,
}

impl RowNormalizer {
    pub fn new(resolver: ReferenceResolver) -> Self {
        Self { resolver }
    }

    /// Return `payload` with missing references filled in
    ///
    /// Never fails: on any resolution error the original payload is returned
    /// unmodified so the surrounding create workflow proceeds.
    pub async fn normalize(
        &self,
        payload: WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> WritePayload {
        match self.try_normalize(&payload, candidate, context).await {
            Ok(Some(updated)) => updated,
            Ok(None) => payload,
            Err(e) => {
                warn!(
                    source = "row-normalizer",
                    subscription_id = candidate.id,
                    error = %e,
                    "Reference resolution failed, leaving write payload untouched"
                );
                payload
            }
        }
    }

    /// Compute the normalized payload; `Ok(None)` when nothing applies
    pub async fn try_normalize(
        &self,
        payload: &WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> Result<Option<WritePayload>> {
        if context != SaveContext::Create || candidate.kind != RecordKind::Subscription {
            return Ok(None);
        }

        let Some(index) = payload.position(SUBSCRIPTIONS_TABLE) else {
            return Ok(None);
        };
        let row = &payload.rows[index];

        let parent_missing = row.is_empty_ref(PARENT_FIELD);
        let owner_missing = row.is_empty_ref(CUSTOMER_FIELD);
        if !parent_missing && !owner_missing {
            return Ok(None);
        }

        // In-memory object first, then the value already in the row, then
        // the secondary pointer.
        let parent_id = match candidate.parent_id.or_else(|| row.ref_value(PARENT_FIELD)) {
            Some(parent_id) => Some(parent_id),
            None => self.resolver.try_secondary_parent(candidate.id).await?,
        };

        let customer_id = match candidate.customer_id {
            Some(customer_id) => Some(customer_id),
            None => match parent_id {
                Some(parent_id) => self.resolver.try_owner(parent_id).await?,
                None => None,
            },
        };

        let mut updated = payload.clone();
        let row = &mut updated.rows[index];
        let mut changed = false;

        if parent_missing {
            if let Some(parent_id) = parent_id {
                row.set_ref(PARENT_FIELD, parent_id);
                changed = true;
            }
        }
        if owner_missing {
            if let Some(customer_id) = customer_id {
                row.set_ref(CUSTOMER_FIELD, customer_id);
                changed = true;
            }
        }

        if !changed {
            return Ok(None);
        }

        info!(
            source = "row-normalizer",
            subscription_id = candidate.id,
            parent_order_id = parent_id.unwrap_or(0),
            customer_id = customer_id.unwrap_or(0),
            "Filled missing subscription references before write"
        );

        Ok(Some(updated))
    }
}

#[async_trait]
impl WriteInterceptor for RowNormalizer {
    fn name(&self) -> &'static str {
        "row-normalizer"
    }

    /// Runs after every other interceptor so it normalizes their output
    fn priority(&self) -> i32 {
        LAST_PRIORITY
    }

    async fn intercept(
        &self,
        payload: WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> WritePayload {
        self.normalize(payload, candidate, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::OrderStatus;
    use crate::payload::{FieldFormat, RowDescriptor};
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, RowNormalizer) {
        let store = Arc::new(MemoryStore::new());
        store.insert_order(500, OrderStatus::Pending, Some(42), 1_700_000_000);
        let normalizer = RowNormalizer::new(ReferenceResolver::new(store.clone(), store.clone()));
        (store, normalizer)
    }

    fn payload(parent: serde_json::Value, customer: serde_json::Value) -> WritePayload {
        WritePayload::new(vec![
            RowDescriptor::new("subscription_meta").with(
                "billing_period",
                json!("month"),
                FieldFormat::Text,
            ),
            RowDescriptor::new(SUBSCRIPTIONS_TABLE)
                .with(PARENT_FIELD, parent, FieldFormat::Text)
                .with(CUSTOMER_FIELD, customer, FieldFormat::Text)
                .with("status", json!("pending"), FieldFormat::Text),
        ])
    }

    fn candidate(parent_id: Option<i64>, customer_id: Option<i64>) -> CandidateRecord {
        CandidateRecord {
            id: 901,
            kind: RecordKind::Subscription,
            parent_id,
            customer_id,
        }
    }

    #[tokio::test]
    async fn test_fills_from_candidate_and_owner_lookup() {
        let (_store, normalizer) = setup();

        let out = normalizer
            .normalize(
                payload(json!(0), json!(0)),
                &candidate(Some(500), None),
                SaveContext::Create,
            )
            .await;

        let row = out.row(SUBSCRIPTIONS_TABLE).unwrap();
        assert_eq!(row.data[PARENT_FIELD], json!(500));
        assert_eq!(row.data[CUSTOMER_FIELD], json!(42));
        assert_eq!(row.formats[PARENT_FIELD], FieldFormat::Integer);
        assert_eq!(row.formats[CUSTOMER_FIELD], FieldFormat::Integer);
        assert_eq!(out.rows[0], payload(json!(0), json!(0)).rows[0]);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_pointer() {
        let (store, normalizer) = setup();
        store.set_secondary_parent(901, 500);

        let out = normalizer
            .normalize(payload(json!("0"), json!("")), &candidate(None, None), SaveContext::Create)
            .await;

        let row = out.row(SUBSCRIPTIONS_TABLE).unwrap();
        assert_eq!(row.data[PARENT_FIELD], json!(500));
        assert_eq!(row.data[CUSTOMER_FIELD], json!(42));
    }

    #[tokio::test]
    async fn test_candidate_owner_preferred_over_lookup() {
        let (_store, normalizer) = setup();

        let out = normalizer
            .normalize(
                payload(json!(0), json!(0)),
                &candidate(Some(500), Some(77)),
                SaveContext::Create,
            )
            .await;

        assert_eq!(out.row(SUBSCRIPTIONS_TABLE).unwrap().data[CUSTOMER_FIELD], json!(77));
    }

    #[tokio::test]
    async fn test_never_clobbers_existing_value() {
        let (_store, normalizer) = setup();

        let input = payload(json!(0), json!(13));
        let out = normalizer
            .normalize(input, &candidate(Some(500), None), SaveContext::Create)
            .await;

        let row = out.row(SUBSCRIPTIONS_TABLE).unwrap();
        assert_eq!(row.data[PARENT_FIELD], json!(500));
        assert_eq!(row.data[CUSTOMER_FIELD], json!(13));
        assert_eq!(row.formats[CUSTOMER_FIELD], FieldFormat::Text);
    }

    #[tokio::test]
    async fn test_existing_row_parent_used_for_owner() {
        let (_store, normalizer) = setup();

        let out = normalizer
            .normalize(payload(json!(500), json!(0)), &candidate(None, None), SaveContext::Create)
            .await;

        let row = out.row(SUBSCRIPTIONS_TABLE).unwrap();
        assert_eq!(row.data[PARENT_FIELD], json!(500));
        assert_eq!(row.data[CUSTOMER_FIELD], json!(42));
    }

    #[tokio::test]
    async fn test_skips_updates_and_other_kinds() {
        let (_store, normalizer) = setup();
        let input = payload(json!(0), json!(0));

        let out = normalizer
            .normalize(input.clone(), &candidate(Some(500), None), SaveContext::Update)
            .await;
        assert_eq!(out, input);

        let mut order = candidate(Some(500), None);
        order.kind = RecordKind::Order;
        let out = normalizer
            .normalize(input.clone(), &order, SaveContext::Create)
            .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_missing_table_row_is_untouched() {
        let (_store, normalizer) = setup();
        let input = WritePayload::new(vec![RowDescriptor::new("subscription_meta")]);

        let out = normalizer
            .normalize(input.clone(), &candidate(Some(500), None), SaveContext::Create)
            .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_unresolvable_leaves_payload_unchanged() {
        let (_store, normalizer) = setup();
        let input = payload(json!(0), json!(0));

        let result = normalizer
            .try_normalize(&input, &candidate(None, None), SaveContext::Create)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_returns_original() {
        let (store, normalizer) = setup();
        store.fail_reads(true);
        let input = payload(json!(0), json!(0));

        let out = normalizer
            .normalize(input.clone(), &candidate(Some(500), None), SaveContext::Create)
            .await;
        assert_eq!(out, input);
    }
}
