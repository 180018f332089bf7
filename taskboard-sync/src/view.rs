//! A mounted board: cache, orchestrator and realtime subscriptions with one
//! lifetime.

use crate::cache::OptimisticCache;
use crate::config::RefreshConfig;
use crate::error::{BoardError, BoardResult};
use crate::orchestrator::BoardOrchestrator;
use crate::realtime::{ChannelState, ResyncController};
use std::sync::Arc;
use std::time::Duration;
use taskboard_core::{BoardSnapshot, OwnerId};
use taskboard_gateway::{Collection, RemoteStore};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    /// Window for absorbing bursts of change notifications.
    pub coalesce: Duration,
}

impl From<&RefreshConfig> for ViewOptions {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            coalesce: Duration::from_millis(config.coalesce_ms),
        }
    }
}

#[derive(Debug)]
pub struct BoardView {
    board: BoardOrchestrator,
    cache: Arc<OptimisticCache>,
    controller: ResyncController,
}

impl BoardView {
    /// Load the board and start listening for changes to both collections.
    pub async fn mount(
        store: Arc<dyn RemoteStore>,
        owner: OwnerId,
        options: ViewOptions,
    ) -> BoardResult<Self> {
        let cache = Arc::new(OptimisticCache::new());
        let board = BoardOrchestrator::new(Arc::clone(&store), Arc::clone(&cache), owner);
        // A failed first load is retried by the subscription refresh.
        board.refresher().refresh_logged("mount").await;

        let controller = ResyncController::start(
            &store,
            board.refresher().clone(),
            &Collection::ALL,
            options.coalesce,
        )
        .await
        .map_err(|e| {
            cache.close();
            BoardError::remote("subscribe to board changes", e)
        })?;

        info!(owner = %owner.as_uuid(), "board view mounted");
        Ok(Self {
            board,
            cache,
            controller,
        })
    }

    pub fn board(&self) -> &BoardOrchestrator {
        &self.board
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.cache.working()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardSnapshot>> {
        self.cache.subscribe()
    }

    pub fn channel_state(&self, collection: Collection) -> Option<ChannelState> {
        self.controller.state(collection)
    }

    pub fn watch_channel(&self, collection: Collection) -> Option<watch::Receiver<ChannelState>> {
        self.controller.watch_state(collection)
    }

    /// Stop all state updates and release the subscriptions.
    ///
    /// Operations still in flight complete against the store but no longer
    /// touch the cache; new operations fail with [`BoardError::Closed`].
    pub async fn teardown(&mut self) {
        if self.cache.is_closed() {
            return;
        }
        self.cache.close();
        self.controller.shutdown().await;
        info!("board view torn down");
    }

    pub fn is_mounted(&self) -> bool {
        !self.cache.is_closed()
    }
}
