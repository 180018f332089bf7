//! Taskboard sync client entry point.
//!
//! Mounts the configured user's board and logs a summary of the working
//! snapshot whenever it changes, until Ctrl-C.

use std::sync::Arc;
use taskboard_core::BoardSnapshot;
use taskboard_gateway::{RemoteStore, StoreClient};
use taskboard_sync::config::SyncConfig;
use taskboard_sync::error::SyncError;
use taskboard_sync::logging::init_tracing;
use taskboard_sync::view::{BoardView, ViewOptions};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    let config = SyncConfig::load()?;
    init_tracing(&config.log)?;

    let client = StoreClient::new(&config.store, &config.session)?;
    let store: Arc<dyn RemoteStore> = Arc::new(client);
    let mut view = BoardView::mount(
        store,
        config.session.owner(),
        ViewOptions::from(&config.refresh),
    )
    .await?;

    let mut updates = view.subscribe();
    log_summary(&updates.borrow_and_update());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("board updates ended");
                    break;
                }
                log_summary(&updates.borrow_and_update());
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    view.teardown().await;
    info!("shutdown complete");
    Ok(())
}

fn log_summary(board: &BoardSnapshot) {
    let columns: Vec<String> = board
        .columns_sorted()
        .into_iter()
        .map(|column| format!("{}({})", column.title, board.tasks_in(&column.id).len()))
        .collect();
    info!(
        columns = board.columns().len(),
        tasks = board.tasks().len(),
        fetched_at = ?board.fetched_at(),
        layout = %columns.join(" | "),
        "board updated"
    );
}
