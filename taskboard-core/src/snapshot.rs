//! Immutable board snapshots and the pure functions that derive new ones.
//!
//! A snapshot is never edited in place once shared. Local edits are described
//! as [`Mutation`] values and applied with [`BoardSnapshot::apply`], which
//! returns a new snapshot; [`SnapshotDiff`] compares two snapshots.

use crate::entities::{BoardEntity, Column, Task, TaskPatch};
use crate::identity::{ColumnId, ProvisionalId, RecordKey, TaskId, Timestamp};
use crate::ordering::{ColumnPositionUpdate, PositionUpdate};
use std::collections::HashMap;

/// Columns and tasks visible to one owner, in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardSnapshot {
    columns: Vec<Column>,
    tasks: Vec<Task>,
    fetched_at: Option<Timestamp>,
}

impl BoardSnapshot {
    pub fn new(columns: Vec<Column>, tasks: Vec<Task>) -> Self {
        Self {
            columns,
            tasks,
            fetched_at: None,
        }
    }

    /// A snapshot stamped with the time its rows were listed.
    pub fn fetched(columns: Vec<Column>, tasks: Vec<Task>, at: Timestamp) -> Self {
        Self {
            columns,
            tasks,
            fetched_at: Some(at),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn fetched_at(&self) -> Option<Timestamp> {
        self.fetched_at
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.tasks.is_empty()
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Columns in display order. Equal positions keep list order.
    pub fn columns_sorted(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.position);
        columns
    }

    /// Tasks of one column in display order. Equal positions keep list order.
    pub fn tasks_in(&self, column: &ColumnId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| &t.column_id == column).collect();
        tasks.sort_by_key(|t| t.position);
        tasks
    }

    /// Ids of one column's tasks in display order.
    pub fn task_order(&self, column: &ColumnId) -> Vec<TaskId> {
        self.tasks_in(column).into_iter().map(|t| t.id).collect()
    }

    /// Return a new snapshot with `mutation` applied.
    pub fn apply(&self, mutation: &Mutation) -> BoardSnapshot {
        let mut next = self.clone();
        next.apply_in_place(mutation);
        next
    }

    /// Replay `mutations` in order on top of this snapshot.
    pub fn replay<'a, I>(&self, mutations: I) -> BoardSnapshot
    where
        I: IntoIterator<Item = &'a Mutation>,
    {
        let mut next = self.clone();
        for mutation in mutations {
            next.apply_in_place(mutation);
        }
        next
    }

    fn apply_in_place(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::InsertColumn(column) => {
                match self.columns.iter_mut().find(|c| c.id == column.id) {
                    Some(existing) => *existing = column.clone(),
                    None => self.columns.push(column.clone()),
                }
            }
            Mutation::RenameColumn { id, title } => {
                if let Some(column) = self.columns.iter_mut().find(|c| &c.id == id) {
                    column.title = title.clone();
                }
            }
            Mutation::RemoveColumn(id) => {
                self.columns.retain(|c| &c.id != id);
                self.tasks.retain(|t| &t.column_id != id);
            }
            Mutation::InsertTask(task) => {
                // A task whose column vanished (e.g. deleted remotely) is dropped.
                if self.column(&task.column_id).is_none() {
                    return;
                }
                match self.tasks.iter_mut().find(|t| t.id == task.id) {
                    Some(existing) => *existing = task.clone(),
                    None => self.tasks.push(task.clone()),
                }
            }
            Mutation::PatchTask { id, patch } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) {
                    patch.apply_to(task);
                }
            }
            Mutation::RemoveTask(id) => {
                self.tasks.retain(|t| &t.id != id);
            }
            Mutation::SetTaskPositions(updates) => {
                for update in updates {
                    if self.column(&update.column_id).is_none() {
                        continue;
                    }
                    if let Some(task) = self.tasks.iter_mut().find(|t| t.id == update.task_id) {
                        task.column_id = update.column_id;
                        task.position = update.position;
                    }
                }
            }
            Mutation::SetColumnPositions(updates) => {
                for update in updates {
                    if let Some(column) = self.columns.iter_mut().find(|c| c.id == update.column_id)
                    {
                        column.position = update.position;
                    }
                }
            }
        }
    }
}

/// A local edit that can be replayed over any snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    InsertColumn(Column),
    RenameColumn { id: ColumnId, title: String },
    /// Removes the column and every task it holds.
    RemoveColumn(ColumnId),
    InsertTask(Task),
    PatchTask { id: TaskId, patch: TaskPatch },
    RemoveTask(TaskId),
    SetTaskPositions(Vec<PositionUpdate>),
    SetColumnPositions(Vec<ColumnPositionUpdate>),
}

impl Mutation {
    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::InsertColumn(_) => "insert_column",
            Mutation::RenameColumn { .. } => "rename_column",
            Mutation::RemoveColumn(_) => "remove_column",
            Mutation::InsertTask(_) => "insert_task",
            Mutation::PatchTask { .. } => "patch_task",
            Mutation::RemoveTask(_) => "remove_task",
            Mutation::SetTaskPositions(_) => "set_task_positions",
            Mutation::SetColumnPositions(_) => "set_column_positions",
        }
    }

    /// The provisional identity this mutation introduces, if it is a create.
    pub fn created_provisional(&self) -> Option<ProvisionalId> {
        match self {
            Mutation::InsertColumn(column) => column.id.provisional_id(),
            Mutation::InsertTask(task) => task.id.provisional_id(),
            _ => None,
        }
    }

    /// The row this mutation deletes, if it is a delete.
    pub fn removed_key(&self) -> Option<RecordKey> {
        match self {
            Mutation::RemoveColumn(id) => Some(id.key()),
            Mutation::RemoveTask(id) => Some(id.key()),
            _ => None,
        }
    }

    /// Insert mutation carrying a confirmed entity.
    pub fn insert(entity: BoardEntity) -> Self {
        match entity {
            BoardEntity::Column(column) => Mutation::InsertColumn(column),
            BoardEntity::Task(task) => Mutation::InsertTask(task),
        }
    }
}

/// Ids that differ between two snapshots, per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added_columns: Vec<ColumnId>,
    pub removed_columns: Vec<ColumnId>,
    pub changed_columns: Vec<ColumnId>,
    pub added_tasks: Vec<TaskId>,
    pub removed_tasks: Vec<TaskId>,
    pub changed_tasks: Vec<TaskId>,
}

impl SnapshotDiff {
    /// What `to` adds, removes or changes relative to `from`.
    pub fn between(from: &BoardSnapshot, to: &BoardSnapshot) -> Self {
        let (added_columns, removed_columns, changed_columns) =
            diff_rows(&from.columns, &to.columns, |c| c.id);
        let (added_tasks, removed_tasks, changed_tasks) =
            diff_rows(&from.tasks, &to.tasks, |t| t.id);
        Self {
            added_columns,
            removed_columns,
            changed_columns,
            added_tasks,
            removed_tasks,
            changed_tasks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.added_tasks.is_empty()
            && self.removed_tasks.is_empty()
            && self.changed_tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added_columns.len()
            + self.removed_columns.len()
            + self.changed_columns.len()
            + self.added_tasks.len()
            + self.removed_tasks.len()
            + self.changed_tasks.len()
    }
}

fn diff_rows<T, K, F>(from: &[T], to: &[T], key: F) -> (Vec<K>, Vec<K>, Vec<K>)
where
    T: PartialEq,
    K: Copy + Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let before: HashMap<K, &T> = from.iter().map(|row| (key(row), row)).collect();
    let after: HashMap<K, &T> = to.iter().map(|row| (key(row), row)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for row in to {
        let id = key(row);
        match before.get(&id) {
            None => added.push(id),
            Some(old) if *old != row => changed.push(id),
            Some(_) => {}
        }
    }
    let removed = from
        .iter()
        .map(&key)
        .filter(|id| !after.contains_key(id))
        .collect();
    (added, removed, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Priority;
    use crate::identity::OwnerId;
    use uuid::Uuid;

    fn owner() -> OwnerId {
        OwnerId(Uuid::nil())
    }

    fn column(title: &str, position: i64) -> Column {
        let mut column = Column::provisional(title, position, owner());
        column.id = ColumnId::confirmed(Uuid::now_v7());
        column
    }

    fn task(title: &str, column: &Column, position: i64) -> Task {
        let mut task = Task::provisional(title, Priority::Medium, column.id, position, owner());
        task.id = TaskId::confirmed(Uuid::now_v7());
        task
    }

    #[test]
    fn removing_a_column_cascades_to_its_tasks() {
        let todo = column("To Do", 0);
        let done = column("Done", 1);
        let a = task("A", &todo, 0);
        let x = task("X", &done, 0);
        let board = BoardSnapshot::new(vec![todo.clone(), done.clone()], vec![a, x.clone()]);

        let next = board.apply(&Mutation::RemoveColumn(todo.id));
        assert_eq!(next.columns(), &[done]);
        assert_eq!(next.tasks(), &[x]);
        // The original snapshot is untouched.
        assert_eq!(board.tasks().len(), 2);
    }

    #[test]
    fn inserting_into_a_missing_column_is_dropped() {
        let todo = column("To Do", 0);
        let orphan = task("A", &todo, 0);
        let board = BoardSnapshot::empty();
        let next = board.apply(&Mutation::InsertTask(orphan));
        assert!(next.is_empty());
    }

    #[test]
    fn insert_replaces_existing_rows_in_place() {
        let todo = column("To Do", 0);
        let a = task("A", &todo, 0);
        let b = task("B", &todo, 1);
        let board = BoardSnapshot::new(vec![todo], vec![a.clone(), b.clone()]);

        let mut renamed = a.clone();
        renamed.title = "A2".to_string();
        let next = board.apply(&Mutation::InsertTask(renamed.clone()));
        assert_eq!(next.tasks(), &[renamed, b]);
    }

    #[test]
    fn tasks_sort_by_position_with_stable_ties() {
        let todo = column("To Do", 0);
        let a = task("A", &todo, 5);
        let b = task("B", &todo, 1);
        let c = task("C", &todo, 5);
        let board = BoardSnapshot::new(vec![todo.clone()], vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(board.task_order(&todo.id), vec![b.id, a.id, c.id]);
    }

    #[test]
    fn diff_reports_added_removed_and_changed_rows() {
        let todo = column("To Do", 0);
        let a = task("A", &todo, 0);
        let b = task("B", &todo, 1);
        let base = BoardSnapshot::new(vec![todo.clone()], vec![a.clone(), b.clone()]);

        let extra = Task::provisional("C", Priority::High, todo.id, 2, owner());
        let next = base.replay(&[
            Mutation::RemoveTask(a.id),
            Mutation::PatchTask {
                id: b.id,
                patch: TaskPatch::title("B2"),
            },
            Mutation::InsertTask(extra.clone()),
        ]);

        let diff = SnapshotDiff::between(&base, &next);
        assert_eq!(diff.removed_tasks, vec![a.id]);
        assert_eq!(diff.changed_tasks, vec![b.id]);
        assert_eq!(diff.added_tasks, vec![extra.id]);
        assert!(diff.added_columns.is_empty());
        assert_eq!(diff.len(), 3);
        assert!(SnapshotDiff::between(&base, &base).is_empty());
    }
}
