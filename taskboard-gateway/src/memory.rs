//! In-memory remote store for tests and offline demos.
//!
//! Behaves like the hosted store as far as the sync core can observe: rows
//! are scoped to the session owner, ids and timestamps are assigned on
//! insert, deleting a column cascades to its tasks, batch upserts are
//! all-or-nothing, and every committed write is broadcast to watchers of the
//! affected collection. Several handles can share one backend to model
//! several clients of the same store.

use crate::error::{GatewayError, GatewayResult};
use crate::store::{RemoteStore, Subscription};
use crate::types::{
    ChangeEvent, ChangeKind, ChannelEvent, Collection, ColumnPatch, ColumnUpsert, NewColumn,
    NewTask, TaskUpsert,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use taskboard_core::{Column, ColumnId, EntityId, OwnerId, Priority, Task, TaskId, TaskPatch};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 256;
const SUBSCRIPTION_BUFFER: usize = 64;

/// Failure the store returns instead of performing the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Transient server-side failure (HTTP 503).
    Unavailable,
    /// Row-level security refusal.
    Unauthorized,
    Rejected { status: u16, message: String },
}

impl InjectedFailure {
    fn into_error(self) -> GatewayError {
        match self {
            InjectedFailure::Unavailable => GatewayError::Rejected {
                status: 503,
                message: "service unavailable".to_string(),
            },
            InjectedFailure::Unauthorized => unauthorized("permission denied"),
            InjectedFailure::Rejected { status, message } => {
                GatewayError::Rejected { status, message }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    columns: Vec<Column>,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Change {
        collection: Collection,
        kind: ChangeKind,
        owner: OwnerId,
    },
    /// Every watcher drops and re-joins.
    Reconnect,
}

#[derive(Debug)]
struct Backend {
    tables: RwLock<Tables>,
    signals: broadcast::Sender<Signal>,
}

/// In-memory [`RemoteStore`] with failure injection and write accounting.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    backend: Arc<Backend>,
    session: Option<OwnerId>,
    write_failures: Arc<Mutex<VecDeque<InjectedFailure>>>,
    read_failures: Arc<Mutex<VecDeque<InjectedFailure>>>,
    writes: Arc<AtomicUsize>,
    task_batches: Arc<Mutex<Vec<Vec<TaskUpsert>>>>,
}

impl InMemoryStore {
    /// A fresh, empty store signed in as `owner`.
    pub fn new(owner: OwnerId) -> Self {
        let (signals, _) = broadcast::channel(BROADCAST_CAPACITY);
        let backend = Arc::new(Backend {
            tables: RwLock::new(Tables::default()),
            signals,
        });
        Self::with_backend(backend, Some(owner))
    }

    /// A store with no signed-in user. Every call is refused.
    pub fn anonymous() -> Self {
        let mut store = Self::new(OwnerId::new(Uuid::nil()));
        store.session = None;
        store
    }

    /// Another client of the same backend, signed in as `owner`.
    pub fn connect_as(&self, owner: OwnerId) -> Self {
        Self::with_backend(Arc::clone(&self.backend), Some(owner))
    }

    fn with_backend(backend: Arc<Backend>, session: Option<OwnerId>) -> Self {
        Self {
            backend,
            session,
            write_failures: Arc::new(Mutex::new(VecDeque::new())),
            read_failures: Arc::new(Mutex::new(VecDeque::new())),
            writes: Arc::new(AtomicUsize::new(0)),
            task_batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn session(&self) -> Option<OwnerId> {
        self.session
    }

    /// Insert a column directly, bypassing failure injection and accounting.
    pub fn seed_column(&self, title: &str, position: i64) -> Column {
        let owner = self.session.unwrap_or(OwnerId::new(Uuid::nil()));
        let now = Utc::now();
        let column = Column {
            id: ColumnId::confirmed(Uuid::now_v7()),
            title: title.to_string(),
            position,
            owner,
            created_at: now,
            updated_at: now,
        };
        self.tables_mut().columns.push(column.clone());
        self.notify(Collection::Columns, ChangeKind::Insert, owner);
        column
    }

    /// Insert a task directly, bypassing failure injection and accounting.
    pub fn seed_task(&self, title: &str, column: &ColumnId, position: i64, priority: Priority) -> Task {
        let owner = self.session.unwrap_or(OwnerId::new(Uuid::nil()));
        let now = Utc::now();
        let task = Task {
            id: TaskId::confirmed(Uuid::now_v7()),
            title: title.to_string(),
            priority,
            column_id: *column,
            position,
            owner,
            created_at: now,
            updated_at: now,
        };
        self.tables_mut().tasks.push(task.clone());
        self.notify(Collection::Tasks, ChangeKind::Insert, owner);
        task
    }

    /// Make the next write through this handle fail.
    pub fn fail_next_write(&self, failure: InjectedFailure) {
        lock(&self.write_failures).push_back(failure);
    }

    /// Make the next list call through this handle fail.
    pub fn fail_next_read(&self, failure: InjectedFailure) {
        lock(&self.read_failures).push_back(failure);
    }

    /// Write calls attempted through this handle, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Task batches submitted to `upsert_tasks` through this handle.
    pub fn task_batches(&self) -> Vec<Vec<TaskUpsert>> {
        lock(&self.task_batches).clone()
    }

    /// Every column row regardless of owner.
    pub fn all_columns(&self) -> Vec<Column> {
        self.tables().columns.clone()
    }

    /// Every task row regardless of owner.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.tables().tasks.clone()
    }

    /// Number of live subscriptions on the shared backend.
    pub fn watcher_count(&self) -> usize {
        self.backend.signals.receiver_count()
    }

    /// Emit a change notification without touching any row.
    pub fn announce(&self, collection: Collection, kind: ChangeKind) {
        if let Some(owner) = self.session {
            self.notify(collection, kind, owner);
        }
    }

    /// Drop and re-join every subscription on the shared backend.
    pub fn simulate_reconnect(&self) {
        let _ = self.backend.signals.send(Signal::Reconnect);
    }

    fn tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.backend
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn tables_mut(&self) -> RwLockWriteGuard<'_, Tables> {
        self.backend
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, collection: Collection, kind: ChangeKind, owner: OwnerId) {
        // No receivers is fine.
        let _ = self.backend.signals.send(Signal::Change {
            collection,
            kind,
            owner,
        });
    }

    fn begin_read(&self) -> GatewayResult<OwnerId> {
        if let Some(failure) = lock(&self.read_failures).pop_front() {
            return Err(failure.into_error());
        }
        self.session
            .ok_or_else(|| unauthorized("no authenticated session"))
    }

    fn begin_write(&self) -> GatewayResult<OwnerId> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = lock(&self.write_failures).pop_front() {
            return Err(failure.into_error());
        }
        self.session
            .ok_or_else(|| unauthorized("no authenticated session"))
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn list_columns(&self) -> GatewayResult<Vec<Column>> {
        let owner = self.begin_read()?;
        let mut columns: Vec<Column> = self
            .tables()
            .columns
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect();
        columns.sort_by_key(|c| (c.position, c.created_at));
        Ok(columns)
    }

    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        let owner = self.begin_read()?;
        let mut tasks: Vec<Task> = self
            .tables()
            .tasks
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.position, t.created_at));
        Ok(tasks)
    }

    async fn create_column(&self, column: NewColumn) -> GatewayResult<Column> {
        let owner = self.begin_write()?;
        check_row_owner(column.user_id, owner, Collection::Columns)?;
        check_title(&column.title, Collection::Columns)?;

        let now = Utc::now();
        let row = Column {
            id: ColumnId::confirmed(Uuid::now_v7()),
            title: column.title,
            position: column.position,
            owner,
            created_at: now,
            updated_at: now,
        };
        self.tables_mut().columns.push(row.clone());
        self.notify(Collection::Columns, ChangeKind::Insert, owner);
        Ok(row)
    }

    async fn update_column(&self, id: EntityId, patch: ColumnPatch) -> GatewayResult<Column> {
        let owner = self.begin_write()?;
        if let Some(title) = &patch.title {
            check_title(title, Collection::Columns)?;
        }
        let updated = {
            let mut tables = self.tables_mut();
            let row = tables
                .columns
                .iter_mut()
                .find(|c| c.id.as_uuid() == Some(id) && c.owner == owner)
                .ok_or_else(|| missing_row(Collection::Columns, id))?;
            if let Some(title) = patch.title {
                row.title = title;
            }
            if let Some(position) = patch.position {
                row.position = position;
            }
            row.updated_at = Utc::now();
            row.clone()
        };
        self.notify(Collection::Columns, ChangeKind::Update, owner);
        Ok(updated)
    }

    async fn delete_column(&self, id: EntityId) -> GatewayResult<()> {
        let owner = self.begin_write()?;
        let cascaded = {
            let mut tables = self.tables_mut();
            let before = tables.columns.len();
            tables
                .columns
                .retain(|c| !(c.id.as_uuid() == Some(id) && c.owner == owner));
            if tables.columns.len() == before {
                return Err(missing_row(Collection::Columns, id));
            }
            let column = ColumnId::confirmed(id);
            let before = tables.tasks.len();
            tables.tasks.retain(|t| t.column_id != column);
            before - tables.tasks.len()
        };
        self.notify(Collection::Columns, ChangeKind::Delete, owner);
        for _ in 0..cascaded {
            self.notify(Collection::Tasks, ChangeKind::Delete, owner);
        }
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> GatewayResult<Task> {
        let owner = self.begin_write()?;
        check_row_owner(task.user_id, owner, Collection::Tasks)?;
        check_title(&task.title, Collection::Tasks)?;

        let column_id = ColumnId::confirmed(task.column_id);
        let row = {
            let mut tables = self.tables_mut();
            check_column_visible(&tables, &column_id, owner)?;
            let now = Utc::now();
            let row = Task {
                id: TaskId::confirmed(Uuid::now_v7()),
                title: task.title,
                priority: task.priority,
                column_id,
                position: task.position,
                owner,
                created_at: now,
                updated_at: now,
            };
            tables.tasks.push(row.clone());
            row
        };
        self.notify(Collection::Tasks, ChangeKind::Insert, owner);
        Ok(row)
    }

    async fn update_task(&self, id: EntityId, patch: TaskPatch) -> GatewayResult<Task> {
        let owner = self.begin_write()?;
        if let Some(title) = &patch.title {
            check_title(title, Collection::Tasks)?;
        }
        let updated = {
            let mut tables = self.tables_mut();
            let row = tables
                .tasks
                .iter_mut()
                .find(|t| t.id.as_uuid() == Some(id) && t.owner == owner)
                .ok_or_else(|| missing_row(Collection::Tasks, id))?;
            patch.apply_to(row);
            row.updated_at = Utc::now();
            row.clone()
        };
        self.notify(Collection::Tasks, ChangeKind::Update, owner);
        Ok(updated)
    }

    async fn delete_task(&self, id: EntityId) -> GatewayResult<()> {
        let owner = self.begin_write()?;
        {
            let mut tables = self.tables_mut();
            let before = tables.tasks.len();
            tables
                .tasks
                .retain(|t| !(t.id.as_uuid() == Some(id) && t.owner == owner));
            if tables.tasks.len() == before {
                return Err(missing_row(Collection::Tasks, id));
            }
        }
        self.notify(Collection::Tasks, ChangeKind::Delete, owner);
        Ok(())
    }

    async fn upsert_tasks(&self, rows: Vec<TaskUpsert>) -> GatewayResult<Vec<Task>> {
        let owner = self.begin_write()?;
        lock(&self.task_batches).push(rows.clone());

        let mut kinds = Vec::with_capacity(rows.len());
        let saved = {
            let mut tables = self.tables_mut();
            for row in &rows {
                check_row_owner(row.user_id, owner, Collection::Tasks)?;
                check_title(&row.title, Collection::Tasks)?;
                check_column_visible(&tables, &ColumnId::confirmed(row.column_id), owner)?;
                let id = TaskId::confirmed(row.id);
                if let Some(existing) = tables.tasks.iter().find(|t| t.id == id) {
                    check_row_owner(existing.owner, owner, Collection::Tasks)?;
                }
            }

            let now = Utc::now();
            let mut saved = Vec::with_capacity(rows.len());
            for row in rows {
                let id = TaskId::confirmed(row.id);
                let column_id = ColumnId::confirmed(row.column_id);
                match tables.tasks.iter_mut().find(|t| t.id == id) {
                    Some(existing) => {
                        existing.title = row.title;
                        existing.priority = row.priority;
                        existing.column_id = column_id;
                        existing.position = row.position;
                        existing.updated_at = now;
                        saved.push(existing.clone());
                        kinds.push(ChangeKind::Update);
                    }
                    None => {
                        let task = Task {
                            id,
                            title: row.title,
                            priority: row.priority,
                            column_id,
                            position: row.position,
                            owner,
                            created_at: now,
                            updated_at: now,
                        };
                        tables.tasks.push(task.clone());
                        saved.push(task);
                        kinds.push(ChangeKind::Insert);
                    }
                }
            }
            saved
        };
        for kind in kinds {
            self.notify(Collection::Tasks, kind, owner);
        }
        Ok(saved)
    }

    async fn upsert_columns(&self, rows: Vec<ColumnUpsert>) -> GatewayResult<Vec<Column>> {
        let owner = self.begin_write()?;

        let mut kinds = Vec::with_capacity(rows.len());
        let saved = {
            let mut tables = self.tables_mut();
            for row in &rows {
                check_row_owner(row.user_id, owner, Collection::Columns)?;
                check_title(&row.title, Collection::Columns)?;
                let id = ColumnId::confirmed(row.id);
                if let Some(existing) = tables.columns.iter().find(|c| c.id == id) {
                    check_row_owner(existing.owner, owner, Collection::Columns)?;
                }
            }

            let now = Utc::now();
            let mut saved = Vec::with_capacity(rows.len());
            for row in rows {
                let id = ColumnId::confirmed(row.id);
                match tables.columns.iter_mut().find(|c| c.id == id) {
                    Some(existing) => {
                        existing.title = row.title;
                        existing.position = row.position;
                        existing.updated_at = now;
                        saved.push(existing.clone());
                        kinds.push(ChangeKind::Update);
                    }
                    None => {
                        let column = Column {
                            id,
                            title: row.title,
                            position: row.position,
                            owner,
                            created_at: now,
                            updated_at: now,
                        };
                        tables.columns.push(column.clone());
                        saved.push(column);
                        kinds.push(ChangeKind::Insert);
                    }
                }
            }
            saved
        };
        for kind in kinds {
            self.notify(Collection::Columns, kind, owner);
        }
        Ok(saved)
    }

    async fn watch(&self, collection: Collection) -> GatewayResult<Subscription> {
        let owner = self
            .session
            .ok_or_else(|| unauthorized("no authenticated session"))?;
        let mut signals = self.backend.signals.subscribe();
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let worker = tokio::spawn(async move {
            if sender.send(ChannelEvent::Subscribed).await.is_err() {
                return;
            }
            loop {
                let event = match signals.recv().await {
                    Ok(Signal::Change {
                        collection: changed,
                        kind,
                        owner: row_owner,
                    }) if changed == collection && row_owner == owner => {
                        ChannelEvent::Change(ChangeEvent {
                            kind: Some(kind),
                            collection,
                        })
                    }
                    Ok(Signal::Change { .. }) => continue,
                    Ok(Signal::Reconnect) => {
                        let dropped = ChannelEvent::Disconnected {
                            reason: "simulated reconnect".to_string(),
                        };
                        if sender.send(dropped).await.is_err() {
                            return;
                        }
                        ChannelEvent::Subscribed
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        ChannelEvent::Change(ChangeEvent {
                            kind: None,
                            collection,
                        })
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                if sender.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(Subscription::new(collection, receiver, worker))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unauthorized(message: &str) -> GatewayError {
    GatewayError::Unauthorized {
        message: message.to_string(),
    }
}

fn missing_row(collection: Collection, id: EntityId) -> GatewayError {
    GatewayError::not_found(format!("{} row {} not found", collection, id))
}

fn check_row_owner(row_owner: OwnerId, session: OwnerId, collection: Collection) -> GatewayResult<()> {
    if row_owner != session {
        return Err(unauthorized(&format!(
            "new row violates row-level security policy for table \"{}\"",
            collection
        )));
    }
    Ok(())
}

fn check_title(title: &str, collection: Collection) -> GatewayResult<()> {
    if title.trim().is_empty() {
        return Err(GatewayError::Rejected {
            status: 400,
            message: format!("null value in column \"title\" of relation \"{}\"", collection),
        });
    }
    Ok(())
}

fn check_column_visible(tables: &Tables, column: &ColumnId, owner: OwnerId) -> GatewayResult<()> {
    if tables
        .columns
        .iter()
        .any(|c| &c.id == column && c.owner == owner)
    {
        return Ok(());
    }
    Err(GatewayError::Rejected {
        status: 409,
        message: "insert or update on table \"tasks\" violates foreign key constraint".to_string(),
    })
}
