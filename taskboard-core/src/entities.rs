//! Board entities as stored remotely and held in snapshots.

use crate::identity::{ColumnId, OwnerId, TaskId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// A named, ordered bucket of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    pub position: i64,
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Column {
    /// A column that exists only locally until the store confirms it.
    pub fn provisional(title: impl Into<String>, position: i64, owner: OwnerId) -> Self {
        let now = Utc::now();
        Self {
            id: ColumnId::provisional(),
            title: title.into(),
            position,
            owner,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A titled, prioritized unit of work inside exactly one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    pub column_id: ColumnId,
    pub position: i64,
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// A task that exists only locally until the store confirms it.
    pub fn provisional(
        title: impl Into<String>,
        priority: Priority,
        column_id: ColumnId,
        position: i64,
        owner: OwnerId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::provisional(),
            title: title.into(),
            priority,
            column_id,
            position,
            owner,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a task's editable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            priority: None,
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            title: None,
            priority: Some(priority),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.priority.is_none()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
    }
}

/// Either kind of board row, used where a confirmation may be for either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEntity {
    Column(Column),
    Task(Task),
}
