//! Property-based tests for the ordering planners.
//!
//! Any sequence of moves and reorders must leave every column, sorted by
//! position, in exactly the order the user asked for.

use proptest::prelude::*;
use taskboard_core::{
    plan_task_move, plan_task_reorder, BoardSnapshot, Column, ColumnId, Mutation, OwnerId,
    Priority, Task, TaskId,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Move {
        task: usize,
        column: usize,
        index: usize,
    },
    Reorder {
        column: usize,
        keys: Vec<u32>,
    },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), any::<usize>(), 0usize..12)
            .prop_map(|(task, column, index)| Op::Move { task, column, index }),
        (any::<usize>(), prop::collection::vec(any::<u32>(), 0..12))
            .prop_map(|(column, keys)| Op::Reorder { column, keys }),
    ]
}

/// Columns count plus (column selector, position) for each task.
fn arb_layout() -> impl Strategy<Value = (usize, Vec<(usize, i64)>)> {
    (
        1usize..4,
        prop::collection::vec((any::<usize>(), 0i64..20), 0..15),
    )
}

fn build_board(columns: usize, tasks: &[(usize, i64)]) -> (BoardSnapshot, Vec<ColumnId>) {
    let owner = OwnerId(Uuid::nil());
    let cols: Vec<Column> = (0..columns)
        .map(|i| {
            let mut column = Column::provisional(format!("C{}", i), i as i64, owner);
            column.id = ColumnId::confirmed(Uuid::now_v7());
            column
        })
        .collect();
    let ids: Vec<ColumnId> = cols.iter().map(|c| c.id).collect();
    let rows: Vec<Task> = tasks
        .iter()
        .enumerate()
        .map(|(i, (selector, position))| {
            let column = ids[selector % ids.len()];
            let mut task =
                Task::provisional(format!("T{}", i), Priority::Medium, column, *position, owner);
            task.id = TaskId::confirmed(Uuid::now_v7());
            task
        })
        .collect();
    (BoardSnapshot::new(cols, rows), ids)
}

fn model_of(board: &BoardSnapshot, columns: &[ColumnId]) -> Vec<Vec<TaskId>> {
    columns.iter().map(|c| board.task_order(c)).collect()
}

proptest! {
    #[test]
    fn moves_and_reorders_keep_intended_order(
        (columns, tasks) in arb_layout(),
        ops in prop::collection::vec(arb_op(), 1..20),
    ) {
        let (mut board, column_ids) = build_board(columns, &tasks);
        let mut model = model_of(&board, &column_ids);
        let task_ids: Vec<TaskId> = board.tasks().iter().map(|t| t.id).collect();

        for op in ops {
            match op {
                Op::Move { task, column, index } => {
                    if task_ids.is_empty() {
                        continue;
                    }
                    let task_id = task_ids[task % task_ids.len()];
                    let dest = column % column_ids.len();

                    for order in model.iter_mut() {
                        order.retain(|id| *id != task_id);
                    }
                    let slot = index.min(model[dest].len());
                    model[dest].insert(slot, task_id);

                    let plan = plan_task_move(&board, &task_id, &column_ids[dest], index)
                        .expect("confirmed ids always plan");
                    board = board.apply(&Mutation::SetTaskPositions(plan));
                }
                Op::Reorder { column, keys } => {
                    let dest = column % column_ids.len();
                    let mut order = model[dest].clone();
                    let mut indexed: Vec<(u32, usize, TaskId)> = order
                        .drain(..)
                        .enumerate()
                        .map(|(i, id)| (keys.get(i).copied().unwrap_or(i as u32), i, id))
                        .collect();
                    indexed.sort_by_key(|(key, i, _)| (*key, *i));
                    let wanted: Vec<TaskId> = indexed.into_iter().map(|(_, _, id)| id).collect();

                    let plan = plan_task_reorder(&board, &column_ids[dest], &wanted)
                        .expect("full permutation always plans");
                    prop_assert_eq!(plan.len(), wanted.len());
                    board = board.apply(&Mutation::SetTaskPositions(plan));
                    model[dest] = wanted;
                }
            }

            prop_assert_eq!(model_of(&board, &column_ids), model.clone());
        }
    }

    #[test]
    fn moving_to_current_slot_plans_nothing(
        (columns, tasks) in arb_layout(),
    ) {
        let (board, column_ids) = build_board(columns, &tasks);
        for column in &column_ids {
            for (index, task_id) in board.task_order(column).iter().enumerate() {
                let plan = plan_task_move(&board, task_id, column, index).unwrap();
                prop_assert!(plan.is_empty());
            }
        }
    }

    #[test]
    fn every_planned_write_targets_the_destination_column(
        (columns, tasks) in arb_layout(),
        task in any::<usize>(),
        column in any::<usize>(),
        index in 0usize..12,
    ) {
        let (board, column_ids) = build_board(columns, &tasks);
        prop_assume!(!board.tasks().is_empty());
        let task_id = board.tasks()[task % board.tasks().len()].id;
        let dest = column_ids[column % column_ids.len()];

        let plan = plan_task_move(&board, &task_id, &dest, index).unwrap();
        prop_assert!(plan.iter().all(|u| u.column_id == dest));
        if !plan.is_empty() {
            prop_assert!(plan.iter().any(|u| u.task_id == task_id));
        }
    }
}
