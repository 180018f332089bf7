//! Gateway to the hosted store: REST for rows, websocket for change feeds.

use crate::config::{SessionConfig, StoreConfig};
use crate::error::GatewayResult;
use crate::realtime::RealtimeClient;
use crate::rest::RestClient;
use crate::store::{RemoteStore, Subscription};
use crate::types::{Collection, ColumnPatch, ColumnUpsert, NewColumn, NewTask, TaskUpsert};
use async_trait::async_trait;
use taskboard_core::{Column, EntityId, Task, TaskPatch};

#[derive(Clone)]
pub struct StoreClient {
    rest: RestClient,
    realtime: RealtimeClient,
}

impl StoreClient {
    pub fn new(config: &StoreConfig, session: &SessionConfig) -> GatewayResult<Self> {
        let rest = RestClient::new(config, session)?;
        let realtime = RealtimeClient::new(config, session)?;
        Ok(Self { rest, realtime })
    }
}

#[async_trait]
impl RemoteStore for StoreClient {
    async fn list_columns(&self) -> GatewayResult<Vec<Column>> {
        self.rest.select(Collection::Columns.table()).await
    }

    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        self.rest.select(Collection::Tasks.table()).await
    }

    async fn create_column(&self, column: NewColumn) -> GatewayResult<Column> {
        self.rest.insert(Collection::Columns.table(), &column).await
    }

    async fn update_column(&self, id: EntityId, patch: ColumnPatch) -> GatewayResult<Column> {
        self.rest
            .update(Collection::Columns.table(), id, &patch)
            .await
    }

    async fn delete_column(&self, id: EntityId) -> GatewayResult<()> {
        self.rest.delete(Collection::Columns.table(), id).await
    }

    async fn create_task(&self, task: NewTask) -> GatewayResult<Task> {
        self.rest.insert(Collection::Tasks.table(), &task).await
    }

    async fn update_task(&self, id: EntityId, patch: TaskPatch) -> GatewayResult<Task> {
        self.rest.update(Collection::Tasks.table(), id, &patch).await
    }

    async fn delete_task(&self, id: EntityId) -> GatewayResult<()> {
        self.rest.delete(Collection::Tasks.table(), id).await
    }

    async fn upsert_tasks(&self, rows: Vec<TaskUpsert>) -> GatewayResult<Vec<Task>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.rest.upsert(Collection::Tasks.table(), &rows).await
    }

    async fn upsert_columns(&self, rows: Vec<ColumnUpsert>) -> GatewayResult<Vec<Column>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.rest.upsert(Collection::Columns.table(), &rows).await
    }

    async fn watch(&self, collection: Collection) -> GatewayResult<Subscription> {
        Ok(self.realtime.subscribe(collection))
    }
}
