//! Taskboard Sync - Client Reconciliation Core
//!
//! Keeps a locally rendered board consistent with the hosted store while
//! several clients edit it. Edits show up immediately through the
//! [`OptimisticCache`], are written through a [`RemoteStore`](taskboard_gateway::RemoteStore),
//! and are reconciled by authoritative refreshes that the
//! [`ResyncController`] triggers on every change notification.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod realtime;
pub mod refresh;
pub mod view;

pub use cache::{CommitOutcome, FetchTicket, MutationId, OptimisticCache, ResyncOutcome};
pub use config::{ConfigError, LogConfig, RefreshConfig, SyncConfig};
pub use error::{BoardError, BoardResult, SyncError};
pub use orchestrator::{BoardOrchestrator, MoveOutcome};
pub use realtime::{ChannelState, ResyncController};
pub use refresh::{RefreshOutcome, Refresher};
pub use view::{BoardView, ViewOptions};
