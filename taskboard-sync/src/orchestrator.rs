//! Board operations: validate, apply optimistically, write, reconcile.
//!
//! Every operation validates before touching the cache. A remote failure
//! rolls back all pending local edits and triggers a refresh before the
//! error is returned.

use crate::cache::{CommitOutcome, OptimisticCache};
use crate::error::{BoardError, BoardResult};
use crate::refresh::{RefreshOutcome, Refresher};
use std::sync::Arc;
use taskboard_core::{
    next_position, plan_column_move, plan_column_reorder, plan_task_move, plan_task_reorder,
    require_confirmed_column, require_confirmed_task, require_title, BoardEntity, BoardSnapshot,
    Column, ColumnId, ColumnPositionUpdate, Mutation, OwnerId, PositionUpdate, Priority,
    ProvisionalId, RecordKey, Task, TaskId, TaskPatch, ValidationError,
};
use taskboard_gateway::{
    ColumnPatch, ColumnUpsert, GatewayError, NewColumn, NewTask, RemoteStore, TaskUpsert,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of a move or reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Positions were written in one batch.
    Moved { updated: usize },
    /// The requested order is already in place. Nothing was written.
    Unchanged,
}

pub struct BoardOrchestrator {
    store: Arc<dyn RemoteStore>,
    cache: Arc<OptimisticCache>,
    refresher: Refresher,
    owner: OwnerId,
}

impl BoardOrchestrator {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<OptimisticCache>, owner: OwnerId) -> Self {
        let refresher = Refresher::new(Arc::clone(&store), Arc::clone(&cache));
        Self {
            store,
            cache,
            refresher,
            owner,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The working snapshot.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.cache.working()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardSnapshot>> {
        self.cache.subscribe()
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    /// Fetch both collections and make them the confirmed state.
    pub async fn refresh(&self) -> BoardResult<RefreshOutcome> {
        self.ensure_open()?;
        self.refresher
            .refresh()
            .await
            .map_err(|e| BoardError::remote("refresh board", e))
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    /// Append a column. Returns the row as stored.
    pub async fn create_column(&self, title: &str) -> BoardResult<Column> {
        const ACTION: &str = "create column";
        self.ensure_open()?;
        let title = require_title("title", title)?;

        let board = self.cache.working();
        let position = next_position(board.columns().iter().map(|c| c.position))?;
        let provisional = ProvisionalId::next();
        let draft = Column {
            id: ColumnId::from_provisional(provisional),
            ..Column::provisional(title, position, self.owner)
        };
        self.cache
            .apply_optimistic(Mutation::InsertColumn(draft.clone()))?;

        match self.store.create_column(NewColumn::from_column(&draft)).await {
            Ok(column) => {
                info!(column = %column.id, %provisional, "column created");
                self.settle_create(provisional, BoardEntity::Column(column.clone()))
                    .await;
                Ok(column)
            }
            Err(e) => Err(self.fail(ACTION, e, Some(provisional)).await),
        }
    }

    pub async fn rename_column(&self, id: &ColumnId, title: &str) -> BoardResult<Column> {
        const ACTION: &str = "rename column";
        self.ensure_open()?;
        let title = require_title("title", title)?;
        require_confirmed_column(id)?;
        let uuid = self.existing_column(id)?;

        let mutation = self.cache.apply_optimistic(Mutation::RenameColumn {
            id: *id,
            title: title.clone(),
        })?;
        match self.store.update_column(uuid, ColumnPatch::title(title)).await {
            Ok(column) => {
                self.cache.acknowledge(mutation);
                Ok(column)
            }
            Err(e) => Err(self.fail(ACTION, e, None).await),
        }
    }

    /// Delete a column and, with it, its tasks.
    ///
    /// A column whose create has not been confirmed yet is only dropped
    /// locally; the stored row is deleted once the create completes.
    pub async fn delete_column(&self, id: &ColumnId) -> BoardResult<()> {
        const ACTION: &str = "delete column";
        self.ensure_open()?;
        if self.cache.working().column(id).is_none() {
            return Err(ValidationError::UnknownColumn { id: *id }.into());
        }

        let mutation = self.cache.apply_optimistic(Mutation::RemoveColumn(*id))?;
        let RecordKey::Confirmed(uuid) = id.key() else {
            debug!(column = %id, "dropped unconfirmed column locally");
            return Ok(());
        };
        match self.store.delete_column(uuid).await {
            Ok(()) => {
                self.cache.acknowledge(mutation);
                info!(column = %id, "column deleted");
                Ok(())
            }
            Err(e) => Err(self.fail(ACTION, e, None).await),
        }
    }

    /// Move one column to `dest_index` among the board's columns.
    pub async fn move_column(&self, id: &ColumnId, dest_index: usize) -> BoardResult<MoveOutcome> {
        self.ensure_open()?;
        let board = self.cache.working();
        let plan = plan_column_move(&board, id, dest_index)?;
        self.write_column_positions(&board, plan, "move column").await
    }

    /// Give the board exactly the column order in `ordered`.
    pub async fn reorder_columns(&self, ordered: &[ColumnId]) -> BoardResult<MoveOutcome> {
        self.ensure_open()?;
        let board = self.cache.working();
        let plan = plan_column_reorder(&board, ordered)?;
        self.write_column_positions(&board, plan, "reorder columns")
            .await
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Append a task to `column`. `None` means no column is selected.
    pub async fn create_task(
        &self,
        title: &str,
        column: Option<ColumnId>,
        priority: Priority,
    ) -> BoardResult<Task> {
        const ACTION: &str = "create task";
        self.ensure_open()?;
        let title = require_title("title", title)?;
        let column = column.ok_or(ValidationError::MissingSelection { what: "column" })?;
        require_confirmed_column(&column)?;
        self.existing_column(&column)?;

        let board = self.cache.working();
        let position = next_position(board.tasks_in(&column).iter().map(|t| t.position))?;
        let provisional = ProvisionalId::next();
        let draft = Task {
            id: TaskId::from_provisional(provisional),
            ..Task::provisional(title, priority, column, position, self.owner)
        };
        let payload = NewTask::from_task(&draft)?;
        self.cache
            .apply_optimistic(Mutation::InsertTask(draft))?;

        match self.store.create_task(payload).await {
            Ok(task) => {
                info!(task = %task.id, column = %task.column_id, %provisional, "task created");
                self.settle_create(provisional, BoardEntity::Task(task.clone()))
                    .await;
                Ok(task)
            }
            Err(e) => Err(self.fail(ACTION, e, Some(provisional)).await),
        }
    }

    /// Change a task's title, priority, or both.
    pub async fn rename_or_reprioritize_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> BoardResult<Task> {
        const ACTION: &str = "update task";
        self.ensure_open()?;
        if patch.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        let patch = TaskPatch {
            title: patch
                .title
                .as_deref()
                .map(|title| require_title("title", title))
                .transpose()?,
            priority: patch.priority,
        };
        require_confirmed_task(id)?;
        let uuid = self.existing_task(id)?;

        let mutation = self.cache.apply_optimistic(Mutation::PatchTask {
            id: *id,
            patch: patch.clone(),
        })?;
        match self.store.update_task(uuid, patch).await {
            Ok(task) => {
                self.cache.acknowledge(mutation);
                Ok(task)
            }
            Err(e) => Err(self.fail(ACTION, e, None).await),
        }
    }

    /// Delete a task. Unconfirmed tasks are only dropped locally.
    pub async fn delete_task(&self, id: &TaskId) -> BoardResult<()> {
        const ACTION: &str = "delete task";
        self.ensure_open()?;
        if self.cache.working().task(id).is_none() {
            return Err(ValidationError::UnknownTask { id: *id }.into());
        }

        let mutation = self.cache.apply_optimistic(Mutation::RemoveTask(*id))?;
        let RecordKey::Confirmed(uuid) = id.key() else {
            debug!(task = %id, "dropped unconfirmed task locally");
            return Ok(());
        };
        match self.store.delete_task(uuid).await {
            Ok(()) => {
                self.cache.acknowledge(mutation);
                Ok(())
            }
            Err(e) => Err(self.fail(ACTION, e, None).await),
        }
    }

    /// Move a task into `dest_column` at `dest_index`, possibly across
    /// columns. All affected positions are written in one batch.
    pub async fn move_task(
        &self,
        task_id: &TaskId,
        dest_column: &ColumnId,
        dest_index: usize,
    ) -> BoardResult<MoveOutcome> {
        self.ensure_open()?;
        let board = self.cache.working();
        let plan = plan_task_move(&board, task_id, dest_column, dest_index)?;
        self.write_task_positions(&board, plan, "move task").await
    }

    /// Give `column` exactly the task order in `ordered`.
    pub async fn reorder_tasks_in_column(
        &self,
        column: &ColumnId,
        ordered: &[TaskId],
    ) -> BoardResult<MoveOutcome> {
        self.ensure_open()?;
        let board = self.cache.working();
        let plan = plan_task_reorder(&board, column, ordered)?;
        self.write_task_positions(&board, plan, "reorder tasks")
            .await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn write_task_positions(
        &self,
        board: &BoardSnapshot,
        plan: Vec<PositionUpdate>,
        action: &'static str,
    ) -> BoardResult<MoveOutcome> {
        let unchanged = plan.iter().all(|update| {
            board.task(&update.task_id).is_some_and(|task| {
                task.column_id == update.column_id && task.position == update.position
            })
        });
        if unchanged {
            debug!(action, "positions already in place");
            return Ok(MoveOutcome::Unchanged);
        }

        // Rows still being created keep their new place locally only.
        let rows = plan
            .iter()
            .filter(|update| !update.task_id.is_provisional())
            .map(|update| {
                let task = board
                    .task(&update.task_id)
                    .ok_or(ValidationError::UnknownTask { id: update.task_id })?;
                TaskUpsert::from_update(task, update)
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let updated = rows.len();
        let mutation = self
            .cache
            .apply_optimistic(Mutation::SetTaskPositions(plan))?;
        if rows.is_empty() {
            self.cache.acknowledge(mutation);
            return Ok(MoveOutcome::Moved { updated });
        }
        match self.store.upsert_tasks(rows).await {
            Ok(_) => {
                self.cache.acknowledge(mutation);
                debug!(action, updated, "task positions written");
                Ok(MoveOutcome::Moved { updated })
            }
            Err(e) => Err(self.fail(action, e, None).await),
        }
    }

    async fn write_column_positions(
        &self,
        board: &BoardSnapshot,
        plan: Vec<ColumnPositionUpdate>,
        action: &'static str,
    ) -> BoardResult<MoveOutcome> {
        let unchanged = plan.iter().all(|update| {
            board
                .column(&update.column_id)
                .is_some_and(|column| column.position == update.position)
        });
        if unchanged {
            debug!(action, "positions already in place");
            return Ok(MoveOutcome::Unchanged);
        }

        let rows = plan
            .iter()
            .filter(|update| !update.column_id.is_provisional())
            .map(|update| {
                let column = board
                    .column(&update.column_id)
                    .ok_or(ValidationError::UnknownColumn { id: update.column_id })?;
                ColumnUpsert::from_update(column, update)
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let updated = rows.len();
        let mutation = self
            .cache
            .apply_optimistic(Mutation::SetColumnPositions(plan))?;
        if rows.is_empty() {
            self.cache.acknowledge(mutation);
            return Ok(MoveOutcome::Moved { updated });
        }
        match self.store.upsert_columns(rows).await {
            Ok(_) => {
                self.cache.acknowledge(mutation);
                debug!(action, updated, "column positions written");
                Ok(MoveOutcome::Moved { updated })
            }
            Err(e) => Err(self.fail(action, e, None).await),
        }
    }

    /// Reconcile a confirmed create with the cache. If the entity was deleted
    /// locally while the create was in flight, delete the stored row too.
    async fn settle_create(&self, provisional: ProvisionalId, entity: BoardEntity) {
        match self.cache.commit(provisional, entity.clone()) {
            CommitOutcome::Committed => {}
            CommitOutcome::Missing => {
                debug!(%provisional, "create confirmed after its entry was discarded");
            }
            CommitOutcome::DiscardedLocally => {
                let result = match &entity {
                    BoardEntity::Column(column) => match column.id.as_uuid() {
                        Some(uuid) => self.store.delete_column(uuid).await,
                        None => Ok(()),
                    },
                    BoardEntity::Task(task) => match task.id.as_uuid() {
                        Some(uuid) => self.store.delete_task(uuid).await,
                        None => Ok(()),
                    },
                };
                match result {
                    Ok(()) => info!(%provisional, "deleted row created after local delete"),
                    Err(e) => {
                        warn!(%provisional, error = %e, "compensating delete failed");
                        self.refresher.refresh_logged("compensating delete").await;
                    }
                }
            }
        }
    }

    async fn fail(
        &self,
        action: &'static str,
        error: GatewayError,
        provisional: Option<ProvisionalId>,
    ) -> BoardError {
        warn!(action, error = %error, "remote write failed; rolling back");
        if let Some(provisional) = provisional {
            self.cache.forget_provisional(provisional);
        }
        self.cache.rollback();
        self.refresher.refresh_logged("rollback").await;
        BoardError::remote(action, error)
    }

    fn existing_column(&self, id: &ColumnId) -> BoardResult<uuid::Uuid> {
        let board = self.cache.working();
        match (board.column(id), id.as_uuid()) {
            (Some(_), Some(uuid)) => Ok(uuid),
            _ => Err(ValidationError::UnknownColumn { id: *id }.into()),
        }
    }

    fn existing_task(&self, id: &TaskId) -> BoardResult<uuid::Uuid> {
        let board = self.cache.working();
        match (board.task(id), id.as_uuid()) {
            (Some(_), Some(uuid)) => Ok(uuid),
            _ => Err(ValidationError::UnknownTask { id: *id }.into()),
        }
    }

    fn ensure_open(&self) -> BoardResult<()> {
        if self.cache.is_closed() {
            return Err(BoardError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for BoardOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardOrchestrator")
            .field("owner", &self.owner)
            .field("cache", &self.cache)
            .finish()
    }
}
