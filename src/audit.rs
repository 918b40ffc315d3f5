//! Append-only audit trail.
//!
//! Document transitions are appended by the store inside the document's
//! commit. Everything else (delegation changes) goes through
//! [`AuditTrail::record`]. There is no update or delete.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::audit::AuditEntry;
use crate::store::AuditStore;

const DEFAULT_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    page_size: i64,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn record(&self, entry: AuditEntry) -> Result<AuditEntry, AppError> {
        let stored = self.store.append(entry).await?;
        tracing::debug!(
            seq = stored.seq,
            action = stored.action.as_str(),
            resource_id = %stored.resource_id,
            "audit entry recorded"
        );
        Ok(stored)
    }

    /// One bounded page, for callers that paginate themselves.
    pub async fn page(
        &self,
        resource_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        self.store.page(resource_id, offset, limit).await
    }

    /// Every entry for `resource_id` from `offset` on, in creation order.
    ///
    /// Pages are fetched lazily as the stream is polled. To resume after a
    /// partial read, call again with `offset + entries_seen`.
    pub fn history(
        &self,
        resource_id: Uuid,
        offset: i64,
    ) -> BoxStream<'static, Result<AuditEntry, AppError>> {
        let store = self.store.clone();
        let page_size = self.page_size;

        stream::try_unfold((offset.max(0), false), move |(offset, exhausted)| {
            let store = store.clone();
            async move {
                if exhausted {
                    return Ok::<_, AppError>(None);
                }
                let page = store.page(resource_id, offset, page_size).await?;
                if page.is_empty() {
                    return Ok(None);
                }
                let fetched = page.len() as i64;
                let next = (offset + fetched, fetched < page_size);
                Ok(Some((stream::iter(page.into_iter().map(Ok::<AuditEntry, AppError>)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}
