//! Taskboard Test Utilities
//!
//! Shared test infrastructure for the taskboard workspace:
//! - Proptest generators for board entities and snapshots
//! - Fixtures seeding an in-memory store with the reference boards
//! - Store wrappers that hold calls or script the change feed
//! - Async helpers for waiting on board updates
//! - Assertions on task ordering

// Re-export the in-memory store from its source crate
pub use taskboard_gateway::{InMemoryStore, InjectedFailure};

// Re-export core types for convenience
pub use taskboard_core::{
    BoardSnapshot, Column, ColumnId, OwnerId, Priority, Task, TaskId, TaskPatch,
};

use uuid::Uuid;

/// Column with a store-assigned id, for building snapshots without a store.
pub fn confirmed_column(title: &str, position: i64, owner: OwnerId) -> Column {
    Column {
        id: ColumnId::confirmed(Uuid::now_v7()),
        ..Column::provisional(title, position, owner)
    }
}

/// Task with a store-assigned id in `column`.
pub fn confirmed_task(title: &str, column: &Column, position: i64, priority: Priority) -> Task {
    Task {
        id: TaskId::confirmed(Uuid::now_v7()),
        ..Task::provisional(title, priority, column.id, position, column.owner)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for board entities.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Medium),
            Just(Priority::High),
        ]
    }

    /// Non-blank title without surrounding whitespace.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,18}[A-Za-z0-9]"
    }

    /// A confirmed board with 1..=`max_columns` columns and up to
    /// `max_tasks` tasks. Column positions are 0..n; task positions are
    /// distinct and increasing within each column but may have gaps.
    pub fn arb_board(max_columns: usize, max_tasks: usize) -> impl Strategy<Value = BoardSnapshot> {
        (1..=max_columns.max(1))
            .prop_flat_map(move |columns| {
                (
                    proptest::collection::vec(arb_title(), columns),
                    proptest::collection::vec(
                        (arb_title(), 0..columns, 1i64..4, arb_priority()),
                        0..=max_tasks,
                    ),
                )
            })
            .prop_map(|(column_titles, task_specs)| {
                let owner = OwnerId::new(Uuid::now_v7());
                let columns: Vec<Column> = column_titles
                    .iter()
                    .enumerate()
                    .map(|(index, title)| confirmed_column(title, index as i64, owner))
                    .collect();
                let mut next = vec![0i64; columns.len()];
                let tasks = task_specs
                    .iter()
                    .map(|(title, column, gap, priority)| {
                        let position = next[*column];
                        next[*column] += gap;
                        confirmed_task(title, &columns[*column], position, *priority)
                    })
                    .collect();
                BoardSnapshot::new(columns, tasks)
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Stores seeded with the reference boards.

    use super::*;

    pub fn owner() -> OwnerId {
        OwnerId::new(Uuid::now_v7())
    }

    /// "To Do" holding [A@0, B@1, C@2] and "Done" holding [X@0, Y@1].
    #[derive(Debug, Clone)]
    pub struct ScenarioBoard {
        pub store: InMemoryStore,
        pub owner: OwnerId,
        pub todo: Column,
        pub done: Column,
        pub a: Task,
        pub b: Task,
        pub c: Task,
        pub x: Task,
        pub y: Task,
    }

    impl ScenarioBoard {
        pub fn seed() -> Self {
            let owner = owner();
            let store = InMemoryStore::new(owner);
            let todo = store.seed_column("To Do", 0);
            let done = store.seed_column("Done", 1);
            let a = store.seed_task("A", &todo.id, 0, Priority::Medium);
            let b = store.seed_task("B", &todo.id, 1, Priority::Low);
            let c = store.seed_task("C", &todo.id, 2, Priority::High);
            let x = store.seed_task("X", &done.id, 0, Priority::Medium);
            let y = store.seed_task("Y", &done.id, 1, Priority::Medium);
            Self {
                store,
                owner,
                todo,
                done,
                a,
                b,
                c,
                x,
                y,
            }
        }

        /// The seeded rows as a snapshot.
        pub fn snapshot(&self) -> BoardSnapshot {
            BoardSnapshot::new(
                vec![self.todo.clone(), self.done.clone()],
                vec![
                    self.a.clone(),
                    self.b.clone(),
                    self.c.clone(),
                    self.x.clone(),
                    self.y.clone(),
                ],
            )
        }
    }
}

// ============================================================================
// ASYNC HELPERS
// ============================================================================

pub mod wait {
    //! Bounded waits for state produced by background tasks.

    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    pub const WAIT_LIMIT: Duration = Duration::from_secs(5);
    const POLL: Duration = Duration::from_millis(10);

    /// Wait until the published board satisfies `predicate`.
    ///
    /// Panics after [`WAIT_LIMIT`].
    pub async fn board_matching<F>(
        updates: &mut watch::Receiver<Arc<BoardSnapshot>>,
        what: &str,
        predicate: F,
    ) -> Arc<BoardSnapshot>
    where
        F: Fn(&BoardSnapshot) -> bool,
    {
        let waited = tokio::time::timeout(WAIT_LIMIT, updates.wait_for(|board| predicate(board))).await;
        match waited {
            Ok(Ok(board)) => (*board).clone(),
            Ok(Err(_)) => panic!("board updates ended while waiting for {what}"),
            Err(_) => panic!("timed out waiting for {what}"),
        }
    }

    /// Poll `check` until it holds. Panics after [`WAIT_LIMIT`].
    pub async fn until<F>(what: &str, check: F)
    where
        F: Fn() -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while !check() {
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {what}");
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Ordering checks shared by the sync tests.

    use super::*;

    /// The column's tasks, in display order, are exactly `expected`.
    pub fn assert_task_order(board: &BoardSnapshot, column: &ColumnId, expected: &[TaskId]) {
        let actual = board.task_order(column);
        assert_eq!(actual, expected, "unexpected task order in column {column}");
    }

    /// No two tasks in the column share a position.
    pub fn assert_strictly_increasing(board: &BoardSnapshot, column: &ColumnId) {
        let positions: Vec<i64> = board.tasks_in(column).iter().map(|t| t.position).collect();
        assert!(
            positions.windows(2).all(|w| w[0] < w[1]),
            "positions in column {column} are not strictly increasing: {positions:?}"
        );
    }
}

// ============================================================================
// MOCK STORES
// ============================================================================

pub mod mocks {
    //! [`RemoteStore`] wrappers around [`InMemoryStore`] for timing-sensitive
    //! tests.

    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use taskboard_core::{EntityId, TaskPatch};
    use taskboard_gateway::{
        ChannelEvent, Collection, ColumnPatch, ColumnUpsert, GatewayResult, NewColumn, NewTask,
        RemoteStore, Subscription, TaskUpsert,
    };
    use tokio::sync::{mpsc, oneshot};

    /// Write calls a [`GatedStore`] can hold back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum StoreCall {
        CreateColumn,
        CreateTask,
        UpdateTask,
        DeleteTask,
        UpsertTasks,
    }

    /// Holds selected calls until released, so a test can act while a
    /// write is in flight and choose the order held calls complete in.
    #[derive(Debug)]
    pub struct GatedStore {
        inner: InMemoryStore,
        held: Mutex<HashSet<StoreCall>>,
        parked: Mutex<Vec<(StoreCall, oneshot::Sender<()>)>>,
    }

    impl GatedStore {
        pub fn new(inner: InMemoryStore) -> Self {
            Self {
                inner,
                held: Mutex::new(HashSet::new()),
                parked: Mutex::new(Vec::new()),
            }
        }

        /// Hold every later `call` until released.
        pub fn hold(&self, call: StoreCall) {
            self.held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(call);
        }

        /// Stop holding and let every waiting call through.
        pub fn release(&self) {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            held.clear();
            let parked = std::mem::take(
                &mut *self.parked.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for (_, gate) in parked {
                let _ = gate.send(());
            }
        }

        /// Let the most recently held `call` through. Later calls of that
        /// kind are still held. Returns `false` when none is waiting.
        pub fn release_latest(&self, call: StoreCall) -> bool {
            let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
            match parked.iter().rposition(|(held, _)| *held == call) {
                Some(index) => {
                    let (_, gate) = parked.remove(index);
                    let _ = gate.send(());
                    true
                }
                None => false,
            }
        }

        /// Calls currently held.
        pub fn waiting(&self) -> usize {
            self.parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        async fn gate(&self, call: StoreCall) {
            let opened = {
                let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
                if !held.contains(&call) {
                    return;
                }
                let (gate, opened) = oneshot::channel();
                self.parked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((call, gate));
                opened
            };
            let _ = opened.await;
        }
    }

    #[async_trait]
    impl RemoteStore for GatedStore {
        async fn list_columns(&self) -> GatewayResult<Vec<Column>> {
            self.inner.list_columns().await
        }

        async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
            self.inner.list_tasks().await
        }

        async fn create_column(&self, column: NewColumn) -> GatewayResult<Column> {
            self.gate(StoreCall::CreateColumn).await;
            self.inner.create_column(column).await
        }

        async fn update_column(&self, id: EntityId, patch: ColumnPatch) -> GatewayResult<Column> {
            self.inner.update_column(id, patch).await
        }

        async fn delete_column(&self, id: EntityId) -> GatewayResult<()> {
            self.inner.delete_column(id).await
        }

        async fn create_task(&self, task: NewTask) -> GatewayResult<Task> {
            self.gate(StoreCall::CreateTask).await;
            self.inner.create_task(task).await
        }

        async fn update_task(&self, id: EntityId, patch: TaskPatch) -> GatewayResult<Task> {
            self.gate(StoreCall::UpdateTask).await;
            self.inner.update_task(id, patch).await
        }

        async fn delete_task(&self, id: EntityId) -> GatewayResult<()> {
            self.gate(StoreCall::DeleteTask).await;
            self.inner.delete_task(id).await
        }

        async fn upsert_tasks(&self, rows: Vec<TaskUpsert>) -> GatewayResult<Vec<Task>> {
            self.gate(StoreCall::UpsertTasks).await;
            self.inner.upsert_tasks(rows).await
        }

        async fn upsert_columns(&self, rows: Vec<ColumnUpsert>) -> GatewayResult<Vec<Column>> {
            self.inner.upsert_columns(rows).await
        }

        async fn watch(&self, collection: Collection) -> GatewayResult<Subscription> {
            self.inner.watch(collection).await
        }
    }

    /// A store whose change feed is driven by the test and which counts
    /// refreshes (one `list_columns` call per refresh).
    #[derive(Debug)]
    pub struct ScriptedFeedStore {
        inner: InMemoryStore,
        feeds: Mutex<HashMap<Collection, mpsc::Sender<ChannelEvent>>>,
        lists: AtomicUsize,
    }

    impl ScriptedFeedStore {
        pub fn new(inner: InMemoryStore) -> Arc<Self> {
            Arc::new(Self {
                inner,
                feeds: Mutex::new(HashMap::new()),
                lists: AtomicUsize::new(0),
            })
        }

        /// Number of refreshes that reached the store.
        pub fn refreshes(&self) -> usize {
            self.lists.load(Ordering::SeqCst)
        }

        /// Push an event into `collection`'s feed. Returns `false` when no
        /// one is listening.
        pub async fn emit(&self, collection: Collection, event: ChannelEvent) -> bool {
            let sender = self
                .feeds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&collection)
                .cloned();
            match sender {
                Some(sender) => sender.send(event).await.is_ok(),
                None => false,
            }
        }

        /// Whether the subscriber of `collection` has gone away.
        pub fn feed_closed(&self, collection: Collection) -> bool {
            self.feeds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&collection)
                .map_or(true, |sender| sender.is_closed())
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedFeedStore {
        async fn list_columns(&self) -> GatewayResult<Vec<Column>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_columns().await
        }

        async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
            self.inner.list_tasks().await
        }

        async fn create_column(&self, column: NewColumn) -> GatewayResult<Column> {
            self.inner.create_column(column).await
        }

        async fn update_column(&self, id: EntityId, patch: ColumnPatch) -> GatewayResult<Column> {
            self.inner.update_column(id, patch).await
        }

        async fn delete_column(&self, id: EntityId) -> GatewayResult<()> {
            self.inner.delete_column(id).await
        }

        async fn create_task(&self, task: NewTask) -> GatewayResult<Task> {
            self.inner.create_task(task).await
        }

        async fn update_task(&self, id: EntityId, patch: TaskPatch) -> GatewayResult<Task> {
            self.inner.update_task(id, patch).await
        }

        async fn delete_task(&self, id: EntityId) -> GatewayResult<()> {
            self.inner.delete_task(id).await
        }

        async fn upsert_tasks(&self, rows: Vec<TaskUpsert>) -> GatewayResult<Vec<Task>> {
            self.inner.upsert_tasks(rows).await
        }

        async fn upsert_columns(&self, rows: Vec<ColumnUpsert>) -> GatewayResult<Vec<Column>> {
            self.inner.upsert_columns(rows).await
        }

        async fn watch(&self, collection: Collection) -> GatewayResult<Subscription> {
            let (sender, receiver) = mpsc::channel(64);
            self.feeds
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(collection, sender);
            let worker = tokio::spawn(std::future::pending::<()>());
            Ok(Subscription::new(collection, receiver, worker))
        }
    }
}
