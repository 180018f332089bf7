//! Taskboard Core - Board Model
//!
//! Data types shared by every taskboard crate: identities, columns and tasks,
//! immutable board snapshots with the pure functions that derive new ones,
//! and the ordering rules used for drag-and-drop moves. No I/O happens here.

pub mod entities;
pub mod error;
pub mod identity;
pub mod ordering;
pub mod snapshot;

pub use entities::{BoardEntity, Column, Priority, Task, TaskPatch};
pub use error::{
    require_confirmed_column, require_confirmed_task, require_title, ValidationError,
    ValidationResult,
};
pub use identity::{
    ColumnId, EntityId, OwnerId, ParseRecordKeyError, ProvisionalId, RecordKey, TaskId, Timestamp,
};
pub use ordering::{
    next_position, plan_column_move, plan_column_reorder, plan_task_move, plan_task_reorder,
    ColumnPositionUpdate, PositionUpdate,
};
pub use snapshot::{BoardSnapshot, Mutation, SnapshotDiff};
