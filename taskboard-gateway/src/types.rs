//! Wire payloads and change events exchanged with the remote store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use taskboard_core::{
    Column, ColumnId, ColumnPositionUpdate, EntityId, OwnerId, PositionUpdate, Priority, Task,
    TaskId, ValidationError, ValidationResult,
};

/// One of the two tables a board is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Columns,
    Tasks,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Columns, Collection::Tasks];

    /// Table name in the store.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Columns => "columns",
            Collection::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "columns" => Ok(Collection::Columns),
            "tasks" => Ok(Collection::Tasks),
            other => Err(format!("unknown collection: {}", other)),
        }
    }
}

/// Row-level change reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(format!("unknown change type: {}", other)),
        }
    }
}

/// "Something changed in this collection." Carries no row payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// `None` when the store reported a change it did not classify.
    pub kind: Option<ChangeKind>,
    pub collection: Collection,
}

/// What a subscription delivers to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel joined (or re-joined after a drop).
    Subscribed,
    Change(ChangeEvent),
    /// The connection dropped; the gateway is reconnecting.
    Disconnected { reason: String },
}

/// Insert payload for a column. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewColumn {
    pub title: String,
    pub position: i64,
    pub user_id: OwnerId,
}

impl NewColumn {
    pub fn from_column(column: &Column) -> Self {
        Self {
            title: column.title.clone(),
            position: column.position,
            user_id: column.owner,
        }
    }
}

/// Partial update for a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl ColumnPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            position: None,
        }
    }
}

/// Insert payload for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub column_id: EntityId,
    pub position: i64,
    pub user_id: OwnerId,
}

impl NewTask {
    /// Build from an optimistic task. Its column must already be confirmed.
    pub fn from_task(task: &Task) -> ValidationResult<Self> {
        Ok(Self {
            title: task.title.clone(),
            priority: task.priority,
            column_id: confirmed_column(&task.column_id)?,
            position: task.position,
            user_id: task.owner,
        })
    }
}

/// Full task row for a batch upsert-by-id.
///
/// The store treats a batch upsert as an insert that falls back to update,
/// so every NOT-NULL column must be present even when only the position
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskUpsert {
    pub id: EntityId,
    pub title: String,
    pub priority: Priority,
    pub column_id: EntityId,
    pub position: i64,
    pub user_id: OwnerId,
}

impl TaskUpsert {
    /// Complete a position update with the task's current title and priority.
    pub fn from_update(task: &Task, update: &PositionUpdate) -> ValidationResult<Self> {
        Ok(Self {
            id: confirmed_task(&task.id)?,
            title: task.title.clone(),
            priority: task.priority,
            column_id: confirmed_column(&update.column_id)?,
            position: update.position,
            user_id: task.owner,
        })
    }
}

/// Full column row for a batch upsert-by-id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnUpsert {
    pub id: EntityId,
    pub title: String,
    pub position: i64,
    pub user_id: OwnerId,
}

impl ColumnUpsert {
    pub fn from_update(column: &Column, update: &ColumnPositionUpdate) -> ValidationResult<Self> {
        Ok(Self {
            id: confirmed_column(&column.id)?,
            title: column.title.clone(),
            position: update.position,
            user_id: column.owner,
        })
    }
}

/// Store id behind a column identity, rejecting provisional ones.
pub fn confirmed_column(id: &ColumnId) -> ValidationResult<EntityId> {
    id.as_uuid().ok_or_else(|| ValidationError::Provisional {
        entity: "Column",
        id: id.to_string(),
    })
}

/// Store id behind a task identity, rejecting provisional ones.
pub fn confirmed_task(id: &TaskId) -> ValidationResult<EntityId> {
    id.as_uuid().ok_or_else(|| ValidationError::Provisional {
        entity: "Task",
        id: id.to_string(),
    })
}
