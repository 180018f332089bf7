//! Validation errors raised before any state is touched.

use crate::identity::{ColumnId, TaskId};
use thiserror::Error;

/// Input rejected before any optimistic apply or remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("No {what} selected")]
    MissingSelection { what: &'static str },

    #[error("Column not found: {id}")]
    UnknownColumn { id: ColumnId },

    #[error("Task not found: {id}")]
    UnknownTask { id: TaskId },

    #[error("{entity} {id} is still being created")]
    Provisional { entity: &'static str, id: String },

    #[error("Invalid ordering: {reason}")]
    InvalidOrdering { reason: String },

    #[error("Nothing to update")]
    EmptyUpdate,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reject blank titles, returning the trimmed title otherwise.
pub fn require_title(field: &'static str, title: &str) -> ValidationResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(trimmed.to_string())
}

/// Reject provisional column ids where a confirmed row is required.
pub fn require_confirmed_column(id: &ColumnId) -> ValidationResult<()> {
    if id.is_provisional() {
        return Err(ValidationError::Provisional {
            entity: "Column",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Reject provisional task ids where a confirmed row is required.
pub fn require_confirmed_task(id: &TaskId) -> ValidationResult<()> {
    if id.is_provisional() {
        return Err(ValidationError::Provisional {
            entity: "Task",
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_titles_are_rejected() {
        assert_eq!(
            require_title("title", "   "),
            Err(ValidationError::EmptyField { field: "title" })
        );
        assert_eq!(require_title("title", "  Ship it ").unwrap(), "Ship it");
    }

    #[test]
    fn provisional_references_are_rejected() {
        let err = require_confirmed_column(&ColumnId::provisional()).unwrap_err();
        assert!(err.to_string().contains("still being created"));
    }

    #[test]
    fn validation_messages_are_short() {
        let err = ValidationError::MissingSelection { what: "column" };
        assert_eq!(err.to_string(), "No column selected");
        assert_eq!(ValidationError::EmptyUpdate.to_string(), "Nothing to update");
    }
}
