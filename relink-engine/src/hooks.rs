//! Pre-write interceptor chain
//!
//! Interceptors run in ascending priority; equal priorities keep
//! registration order. The Row Normalizer registers at [`LAST_PRIORITY`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::payload::{CandidateRecord, SaveContext, WritePayload};

/// Priority for interceptors that must see every other transformation
pub const LAST_PRIORITY: i32 = i32::MAX;

/// Default priority for host interceptors
pub const DEFAULT_PRIORITY: i32 = 10;

/// Transforms a write payload immediately before commit
#[async_trait]
pub trait WriteInterceptor: Send + Sync {
    /// Identifier used in log lines
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Must not fail; an interceptor that cannot act returns its input
    async fn intercept(
        &self,
        payload: WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> WritePayload;
}

#[derive(Default, Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn WriteInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interceptor: Arc<dyn WriteInterceptor>) {
        self.interceptors.push(interceptor);
        // stable sort keeps registration order for equal priorities
        self.interceptors.sort_by_key(|i| i.priority());
    }

    /// Interceptor names in execution order
    pub fn order(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub async fn apply(
        &self,
        mut payload: WritePayload,
        candidate: &CandidateRecord,
        context: SaveContext,
    ) -> WritePayload {
        for interceptor in &self.interceptors {
            debug!(
                interceptor = interceptor.name(),
                record_id = candidate.id,
                "Applying write interceptor"
            );
            payload = interceptor.intercept(payload, candidate, context).await;
        }
        payload
    }
}
