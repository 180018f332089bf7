//! User-facing errors for board operations.

use crate::config::ConfigError;
use taskboard_core::ValidationError;
use taskboard_gateway::GatewayError;

/// Why a board operation did not take effect.
///
/// The `Display` text is short enough to show to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not authorized to {action}")]
    Authorization {
        action: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to {action}")]
    Remote {
        action: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("Board view is closed")]
    Closed,
}

impl BoardError {
    /// Classify a gateway failure for `action` (e.g. "create task").
    pub fn remote(action: &'static str, source: GatewayError) -> Self {
        if source.is_authorization() {
            BoardError::Authorization { action, source }
        } else {
            BoardError::Remote { action, source }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BoardError::Validation(_))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, BoardError::Authorization { .. })
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

/// Top-level failure of the sync binary.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
