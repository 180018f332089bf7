//! Taskboard Gateway - Remote Store Access
//!
//! The [`RemoteStore`] trait is the only way the sync core talks to the
//! hosted store. [`StoreClient`] implements it over the store's REST table
//! API and realtime websocket; [`InMemoryStore`] implements it in memory for
//! tests and demos.

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod store;
pub mod types;

pub use client::StoreClient;
pub use config::{ReconnectConfig, SessionConfig, StoreConfig};
pub use error::{GatewayError, GatewayResult};
pub use memory::{InMemoryStore, InjectedFailure};
pub use realtime::{Backoff, RealtimeClient};
pub use rest::RestClient;
pub use store::{RemoteStore, Subscription};
pub use types::{
    confirmed_column, confirmed_task, ChangeEvent, ChangeKind, ChannelEvent, Collection,
    ColumnPatch, ColumnUpsert, NewColumn, NewTask, TaskUpsert,
};
