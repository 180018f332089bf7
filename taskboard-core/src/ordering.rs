//! Position assignment for drag-and-drop moves and reorders.
//!
//! Positions are integer sort keys scoped to a column (tasks) or to the
//! board (columns). They need not be contiguous; the planners below only
//! promise that sorting by position afterwards yields the intended order.
//!
//! Plans may name rows whose create is still in flight. Only the row being
//! moved must already be confirmed; callers decide what to persist.

use crate::error::{require_confirmed_column, require_confirmed_task, ValidationError, ValidationResult};
use crate::identity::{ColumnId, TaskId};
use crate::snapshot::BoardSnapshot;
use std::collections::HashSet;

/// New placement for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub task_id: TaskId,
    pub column_id: ColumnId,
    pub position: i64,
}

/// New placement for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPositionUpdate {
    pub column_id: ColumnId,
    pub position: i64,
}

/// Position for an item appended after `positions`: max + 1, or 0 when empty.
pub fn next_position<I>(positions: I) -> ValidationResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    match positions.into_iter().max() {
        None => Ok(0),
        Some(max) => max.checked_add(1).ok_or_else(|| ValidationError::InvalidOrdering {
            reason: format!("no position left after {max}"),
        }),
    }
}

/// Plan moving `task_id` into `dest_column` so it ends up at `dest_index`.
///
/// Returns an empty plan when the task already sits at that index of that
/// column. Otherwise every other task of the destination column is included
/// (shifted when its position is at or above the insertion point) followed by
/// the moved task. When the destination column holds colliding positions the
/// whole column is renumbered by index instead.
pub fn plan_task_move(
    board: &BoardSnapshot,
    task_id: &TaskId,
    dest_column: &ColumnId,
    dest_index: usize,
) -> ValidationResult<Vec<PositionUpdate>> {
    require_confirmed_task(task_id)?;
    require_confirmed_column(dest_column)?;
    let task = board
        .task(task_id)
        .ok_or(ValidationError::UnknownTask { id: *task_id })?;
    if board.column(dest_column).is_none() {
        return Err(ValidationError::UnknownColumn { id: *dest_column });
    }

    let current = board.tasks_in(dest_column);
    let others: Vec<_> = current.iter().copied().filter(|t| t.id != *task_id).collect();
    let index = dest_index.min(others.len());

    if task.column_id == *dest_column {
        let current_index = current.iter().position(|t| t.id == *task_id);
        if current_index == Some(index) {
            return Ok(Vec::new());
        }
    }

    let renumbered = || {
        let mut order: Vec<TaskId> = others.iter().map(|t| t.id).collect();
        order.insert(index, *task_id);
        renumber(dest_column, &order)
    };
    let strictly_increasing = others.windows(2).all(|w| w[0].position < w[1].position);
    if !strictly_increasing {
        return Ok(renumbered());
    }

    let insert_at = match others.get(index) {
        Some(occupant) => occupant.position,
        None => match next_position(others.iter().map(|t| t.position)) {
            Ok(position) => position,
            Err(_) => return Ok(renumbered()),
        },
    };

    // Shifting past i64::MAX falls back to index positions.
    let shifted: Option<Vec<PositionUpdate>> = others
        .iter()
        .map(|t| {
            let position = if t.position >= insert_at {
                t.position.checked_add(1)?
            } else {
                t.position
            };
            Some(PositionUpdate {
                task_id: t.id,
                column_id: *dest_column,
                position,
            })
        })
        .collect();
    let Some(mut updates) = shifted else {
        return Ok(renumbered());
    };
    updates.push(PositionUpdate {
        task_id: *task_id,
        column_id: *dest_column,
        position: insert_at,
    });
    Ok(updates)
}

/// Plan giving `column` exactly the task order in `ordered`.
///
/// Every task receives position = index, whether or not it moved. `ordered`
/// must be a permutation of the column's current tasks.
pub fn plan_task_reorder(
    board: &BoardSnapshot,
    column: &ColumnId,
    ordered: &[TaskId],
) -> ValidationResult<Vec<PositionUpdate>> {
    require_confirmed_column(column)?;
    if board.column(column).is_none() {
        return Err(ValidationError::UnknownColumn { id: *column });
    }
    let current: HashSet<TaskId> = board.task_order(column).into_iter().collect();
    check_permutation(&current, ordered, "task")?;
    Ok(renumber(column, ordered))
}

/// Plan giving the board exactly the column order in `ordered`.
pub fn plan_column_reorder(
    board: &BoardSnapshot,
    ordered: &[ColumnId],
) -> ValidationResult<Vec<ColumnPositionUpdate>> {
    let current: HashSet<ColumnId> = board.columns().iter().map(|c| c.id).collect();
    check_permutation(&current, ordered, "column")?;
    Ok(ordered
        .iter()
        .enumerate()
        .map(|(index, id)| ColumnPositionUpdate {
            column_id: *id,
            position: index as i64,
        })
        .collect())
}

/// Plan moving one column to `dest_index` among the board's columns.
///
/// Returns an empty plan when the column already sits at that index.
pub fn plan_column_move(
    board: &BoardSnapshot,
    column: &ColumnId,
    dest_index: usize,
) -> ValidationResult<Vec<ColumnPositionUpdate>> {
    require_confirmed_column(column)?;
    let mut order: Vec<ColumnId> = board.columns_sorted().into_iter().map(|c| c.id).collect();
    let current_index = order
        .iter()
        .position(|id| id == column)
        .ok_or(ValidationError::UnknownColumn { id: *column })?;
    order.remove(current_index);
    let index = dest_index.min(order.len());
    if index == current_index {
        return Ok(Vec::new());
    }
    order.insert(index, *column);
    plan_column_reorder(board, &order)
}

fn renumber(column: &ColumnId, order: &[TaskId]) -> Vec<PositionUpdate> {
    order
        .iter()
        .enumerate()
        .map(|(index, id)| PositionUpdate {
            task_id: *id,
            column_id: *column,
            position: index as i64,
        })
        .collect()
}

fn check_permutation<K>(current: &HashSet<K>, ordered: &[K], what: &str) -> ValidationResult<()>
where
    K: Copy + Eq + std::hash::Hash + std::fmt::Display,
{
    let mut seen = HashSet::with_capacity(ordered.len());
    for id in ordered {
        if !current.contains(id) {
            return Err(ValidationError::InvalidOrdering {
                reason: format!("{} {} is not part of this ordering", what, id),
            });
        }
        if !seen.insert(*id) {
            return Err(ValidationError::InvalidOrdering {
                reason: format!("{} {} appears more than once", what, id),
            });
        }
    }
    if seen.len() != current.len() {
        return Err(ValidationError::InvalidOrdering {
            reason: format!(
                "expected {} {}s, got {}",
                current.len(),
                what,
                seen.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Column, Priority, Task};
    use crate::identity::OwnerId;
    use crate::snapshot::Mutation;
    use uuid::Uuid;

    struct Board {
        snapshot: BoardSnapshot,
    }

    impl Board {
        fn new() -> Self {
            Self {
                snapshot: BoardSnapshot::empty(),
            }
        }

        fn column(&mut self, title: &str, position: i64) -> ColumnId {
            let mut column = Column::provisional(title, position, OwnerId(Uuid::nil()));
            column.id = ColumnId::confirmed(Uuid::now_v7());
            let id = column.id;
            self.snapshot = self.snapshot.apply(&Mutation::InsertColumn(column));
            id
        }

        fn task(&mut self, title: &str, column: ColumnId, position: i64) -> TaskId {
            let mut task =
                Task::provisional(title, Priority::Medium, column, position, OwnerId(Uuid::nil()));
            task.id = TaskId::confirmed(Uuid::now_v7());
            let id = task.id;
            self.snapshot = self.snapshot.apply(&Mutation::InsertTask(task));
            id
        }

        fn apply(&mut self, updates: Vec<PositionUpdate>) {
            self.snapshot = self.snapshot.apply(&Mutation::SetTaskPositions(updates));
        }
    }

    fn update(task_id: TaskId, column_id: ColumnId, position: i64) -> PositionUpdate {
        PositionUpdate {
            task_id,
            column_id,
            position,
        }
    }

    #[test]
    fn reorder_emits_index_positions_for_every_task() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);
        let b = board.task("B", todo, 1);
        let c = board.task("C", todo, 2);

        let updates = plan_task_reorder(&board.snapshot, &todo, &[c, a, b]).unwrap();
        assert_eq!(
            updates,
            vec![update(c, todo, 0), update(a, todo, 1), update(b, todo, 2)]
        );
        board.apply(updates);
        assert_eq!(board.snapshot.task_order(&todo), vec![c, a, b]);
    }

    #[test]
    fn move_into_other_column_shifts_tasks_at_or_after_the_slot() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let done = board.column("Done", 1);
        let a = board.task("A", todo, 0);
        let x = board.task("X", done, 0);
        let y = board.task("Y", done, 1);

        let updates = plan_task_move(&board.snapshot, &a, &done, 1).unwrap();
        assert_eq!(
            updates,
            vec![update(x, done, 0), update(y, done, 2), update(a, done, 1)]
        );
        board.apply(updates);
        assert_eq!(board.snapshot.task_order(&done), vec![x, a, y]);
        assert!(board.snapshot.task_order(&todo).is_empty());
    }

    #[test]
    fn move_to_current_slot_is_a_no_op() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);
        let b = board.task("B", todo, 1);

        assert!(plan_task_move(&board.snapshot, &a, &todo, 0).unwrap().is_empty());
        assert!(plan_task_move(&board.snapshot, &b, &todo, 1).unwrap().is_empty());
        // Past-the-end indexes clamp to the last slot.
        assert!(plan_task_move(&board.snapshot, &b, &todo, 9).unwrap().is_empty());
    }

    #[test]
    fn move_within_column_respects_gapped_positions() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);
        let b = board.task("B", todo, 5);
        let c = board.task("C", todo, 9);

        board.apply(plan_task_move(&board.snapshot, &c, &todo, 1).unwrap());
        assert_eq!(board.snapshot.task_order(&todo), vec![a, c, b]);

        board.apply(plan_task_move(&board.snapshot, &a, &todo, 2).unwrap());
        assert_eq!(board.snapshot.task_order(&todo), vec![c, b, a]);
    }

    #[test]
    fn move_into_empty_column_starts_at_zero() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let done = board.column("Done", 1);
        let a = board.task("A", todo, 4);

        let updates = plan_task_move(&board.snapshot, &a, &done, 0).unwrap();
        assert_eq!(updates, vec![update(a, done, 0)]);
    }

    #[test]
    fn colliding_positions_are_renumbered() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let done = board.column("Done", 1);
        let a = board.task("A", todo, 0);
        let x = board.task("X", done, 0);
        let y = board.task("Y", done, 0);

        let updates = plan_task_move(&board.snapshot, &a, &done, 1).unwrap();
        assert_eq!(
            updates,
            vec![update(x, done, 0), update(a, done, 1), update(y, done, 2)]
        );
        board.apply(updates);
        assert_eq!(board.snapshot.task_order(&done), vec![x, a, y]);
    }

    #[test]
    fn reorder_rejects_partial_or_duplicated_orderings() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);
        let b = board.task("B", todo, 1);

        assert!(matches!(
            plan_task_reorder(&board.snapshot, &todo, &[a]),
            Err(ValidationError::InvalidOrdering { .. })
        ));
        assert!(matches!(
            plan_task_reorder(&board.snapshot, &todo, &[a, a]),
            Err(ValidationError::InvalidOrdering { .. })
        ));
        assert!(plan_task_reorder(&board.snapshot, &todo, &[b, a]).is_ok());
    }

    #[test]
    fn provisional_ids_cannot_be_positioned() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);

        let pending = ColumnId::provisional();
        assert!(matches!(
            plan_task_move(&board.snapshot, &a, &pending, 0),
            Err(ValidationError::Provisional { .. })
        ));
        assert!(matches!(
            plan_task_move(&board.snapshot, &TaskId::provisional(), &todo, 0),
            Err(ValidationError::Provisional { .. })
        ));
    }

    #[test]
    fn next_position_is_max_plus_one() {
        assert_eq!(next_position(Vec::<i64>::new()).unwrap(), 0);
        assert_eq!(next_position(vec![0]).unwrap(), 1);
        assert_eq!(next_position(vec![3, 7, 2]).unwrap(), 8);
        assert!(matches!(
            next_position(vec![1, i64::MAX]),
            Err(ValidationError::InvalidOrdering { .. })
        ));
    }

    #[test]
    fn moves_near_the_top_of_the_range_renumber_instead_of_overflowing() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let done = board.column("Done", 1);
        let a = board.task("A", todo, 0);
        let x = board.task("X", done, 0);
        let y = board.task("Y", done, i64::MAX);

        let updates = plan_task_move(&board.snapshot, &a, &done, 1).unwrap();
        assert_eq!(
            updates,
            vec![update(x, done, 0), update(a, done, 1), update(y, done, 2)]
        );

        // Appending after i64::MAX has no free slot either.
        let updates = plan_task_move(&board.snapshot, &a, &done, 2).unwrap();
        assert_eq!(
            updates,
            vec![update(x, done, 0), update(y, done, 1), update(a, done, 2)]
        );
    }

    #[test]
    fn reorders_may_include_unconfirmed_tasks() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let a = board.task("A", todo, 0);
        let draft = Task::provisional("Draft", Priority::Low, todo, 1, OwnerId(Uuid::nil()));
        let draft_id = draft.id;
        board.snapshot = board.snapshot.apply(&Mutation::InsertTask(draft));

        let updates = plan_task_reorder(&board.snapshot, &todo, &[draft_id, a]).unwrap();
        assert_eq!(updates, vec![update(draft_id, todo, 0), update(a, todo, 1)]);
    }

    #[test]
    fn column_moves_renumber_the_board() {
        let mut board = Board::new();
        let todo = board.column("To Do", 0);
        let doing = board.column("Doing", 1);
        let done = board.column("Done", 2);

        assert!(plan_column_move(&board.snapshot, &doing, 1).unwrap().is_empty());
        let updates = plan_column_move(&board.snapshot, &done, 0).unwrap();
        assert_eq!(
            updates,
            vec![
                ColumnPositionUpdate { column_id: done, position: 0 },
                ColumnPositionUpdate { column_id: todo, position: 1 },
                ColumnPositionUpdate { column_id: doing, position: 2 },
            ]
        );
    }
}
