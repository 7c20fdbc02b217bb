//! Durable FIFO queue of mutations waiting to reach the remote API.

use crate::models::{Action, FailureRecord, NewOperation, OperationStatus, QueuedOperation};
use crate::services::Store;
use crate::Result;

/// Append-only operation queue over the store.
///
/// There is no dedup: callers must not enqueue the same intent twice.
#[derive(Clone)]
pub struct OperationQueue {
    store: Store,
}

impl OperationQueue {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, operation: &NewOperation) -> Result<i64> {
        let id = self.store.add_operation(operation).await?;
        tracing::info!(
            "Queued {} {} as operation {}",
            operation.method,
            operation.url,
            id
        );
        Ok(id)
    }

    /// Queue a create/update/delete against a REST collection.
    pub async fn enqueue_action(
        &self,
        action: Action,
        collection: &str,
        record_id: Option<&str>,
        payload: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let operation = NewOperation::for_action(action, collection, record_id, payload)?;
        self.enqueue(&operation).await
    }

    /// Pending operations in replay order.
    pub async fn list_pending(&self) -> Result<Vec<QueuedOperation>> {
        self.store.list_operations(OperationStatus::Pending).await
    }

    /// Operations that exhausted their retries.
    pub async fn list_failed(&self) -> Result<Vec<QueuedOperation>> {
        self.store.list_operations(OperationStatus::Failed).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueuedOperation>> {
        self.store.get_operation(id).await
    }

    /// Remove one operation. Succeeds silently if it is already gone.
    pub async fn remove(&self, id: i64) -> Result<()> {
        self.store.delete_operation(id).await
    }

    /// Count one more failed replay. `None` when the entry no longer exists.
    pub async fn record_failure(&self, id: i64, reason: &str) -> Result<Option<FailureRecord>> {
        self.store.record_operation_failure(id, reason).await
    }

    /// Give a failed operation another round of retries.
    pub async fn requeue_failed(&self, id: i64) -> Result<bool> {
        let requeued = self.store.requeue_operation(id).await?;
        if requeued {
            tracing::info!("Operation {} moved back to pending", id);
        }
        Ok(requeued)
    }

    /// Drop everything. Only for an explicit user reset.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.store.clear_operations().await?;
        tracing::warn!("Cleared {} queued operations", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, MAX_RETRIES};
    use pretty_assertions::assert_eq;

    async fn setup() -> OperationQueue {
        OperationQueue::new(Store::open_in_memory().await.unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_appends_without_dedup() {
        let queue = setup().await;
        let op = NewOperation::new(HttpMethod::Post, "/projects").with_body("{}");

        let first = queue.enqueue(&op).await.unwrap();
        let second = queue.enqueue(&op).await.unwrap();

        assert!(second > first);
        assert_eq!(queue.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_action_builds_rest_request() {
        let queue = setup().await;
        let id = queue
            .enqueue_action(
                Action::Update,
                "countries",
                Some("KE"),
                Some(&serde_json::json!({"region": "East Africa"})),
            )
            .await
            .unwrap();

        let op = queue.get(id).await.unwrap().unwrap();
        assert_eq!(op.method, HttpMethod::Put);
        assert_eq!(op.url, "/countries/KE");
        assert_eq!(op.retries, 0);
        assert_eq!(op.status, OperationStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_twice_is_not_an_error() {
        let queue = setup().await;
        let id = queue
            .enqueue(&NewOperation::new(HttpMethod::Delete, "/projects/7"))
            .await
            .unwrap();

        queue.remove(id).await.unwrap();
        queue.remove(id).await.unwrap();
        queue.remove(id + 100).await.unwrap();
        assert!(queue.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_operations_are_listed_separately() {
        let queue = setup().await;
        let doomed = queue
            .enqueue(&NewOperation::new(HttpMethod::Post, "/projects"))
            .await
            .unwrap();
        let healthy = queue
            .enqueue(&NewOperation::new(HttpMethod::Post, "/countries"))
            .await
            .unwrap();

        for _ in 0..MAX_RETRIES {
            queue.record_failure(doomed, "HTTP 500").await.unwrap();
        }

        let pending = queue.list_pending().await.unwrap();
        let failed = queue.list_failed().await.unwrap();
        assert_eq!(pending.iter().map(|op| op.id).collect::<Vec<_>>(), vec![healthy]);
        assert_eq!(failed.iter().map(|op| op.id).collect::<Vec<_>>(), vec![doomed]);
        assert!(failed[0].is_terminal());

        assert!(queue.requeue_failed(doomed).await.unwrap());
        assert_eq!(queue.list_pending().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_empties_both_lists() {
        let queue = setup().await;
        let id = queue
            .enqueue(&NewOperation::new(HttpMethod::Post, "/projects"))
            .await
            .unwrap();
        queue
            .enqueue(&NewOperation::new(HttpMethod::Post, "/projects"))
            .await
            .unwrap();
        for _ in 0..MAX_RETRIES {
            queue.record_failure(id, "boom").await.unwrap();
        }

        assert_eq!(queue.clear().await.unwrap(), 2);
        assert!(queue.list_pending().await.unwrap().is_empty());
        assert!(queue.list_failed().await.unwrap().is_empty());
    }
}
