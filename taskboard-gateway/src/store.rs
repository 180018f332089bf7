//! The remote store seam and its change subscriptions.

use crate::error::GatewayResult;
use crate::types::{
    ChannelEvent, Collection, ColumnPatch, ColumnUpsert, NewColumn, NewTask, TaskUpsert,
};
use async_trait::async_trait;
use taskboard_core::{Column, EntityId, Task, TaskPatch};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Remote CRUD over the `columns` and `tasks` collections.
///
/// Authorization is enforced by the store itself; implementations pass the
/// caller's session along and surface refusals as
/// [`GatewayError::Unauthorized`](crate::GatewayError::Unauthorized).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_columns(&self) -> GatewayResult<Vec<Column>>;

    async fn list_tasks(&self) -> GatewayResult<Vec<Task>>;

    async fn create_column(&self, column: NewColumn) -> GatewayResult<Column>;

    async fn update_column(&self, id: EntityId, patch: ColumnPatch) -> GatewayResult<Column>;

    /// Deletes the column; the store cascades to its tasks.
    async fn delete_column(&self, id: EntityId) -> GatewayResult<()>;

    async fn create_task(&self, task: NewTask) -> GatewayResult<Task>;

    async fn update_task(&self, id: EntityId, patch: TaskPatch) -> GatewayResult<Task>;

    async fn delete_task(&self, id: EntityId) -> GatewayResult<()>;

    /// Upsert complete task rows by id in one request.
    async fn upsert_tasks(&self, rows: Vec<TaskUpsert>) -> GatewayResult<Vec<Task>>;

    /// Upsert complete column rows by id in one request.
    async fn upsert_columns(&self, rows: Vec<ColumnUpsert>) -> GatewayResult<Vec<Column>>;

    /// Subscribe to change notifications for one collection.
    async fn watch(&self, collection: Collection) -> GatewayResult<Subscription>;
}

/// Live change feed for one collection.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) stops the
/// background worker and releases its connection.
pub struct Subscription {
    collection: Collection,
    events: mpsc::Receiver<ChannelEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver fed by `worker`.
    pub fn new(
        collection: Collection,
        events: mpsc::Receiver<ChannelEvent>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            collection,
            events,
            worker: Some(worker),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Wait for the next event. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_next(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.events.close();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("active", &self.worker.is_some())
            .finish()
    }
}
