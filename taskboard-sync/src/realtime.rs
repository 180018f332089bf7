//! Realtime resync controller.
//!
//! One worker per watched collection turns change notifications into
//! authoritative refreshes. Event payloads are never applied; they only say
//! that something changed.

use crate::refresh::Refresher;
use std::sync::Arc;
use std::time::Duration;
use taskboard_gateway::{ChannelEvent, Collection, GatewayResult, RemoteStore, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Subscribed,
    Closed,
}

struct Channel {
    collection: Collection,
    state: Arc<watch::Sender<ChannelState>>,
    worker: Option<JoinHandle<()>>,
}

/// Owns the subscriptions of one board view.
pub struct ResyncController {
    channels: Vec<Channel>,
}

impl ResyncController {
    /// Subscribe to each collection and start refreshing on its events.
    pub async fn start(
        store: &Arc<dyn RemoteStore>,
        refresher: Refresher,
        collections: &[Collection],
        coalesce: Duration,
    ) -> GatewayResult<Self> {
        let mut controller = Self {
            channels: Vec::with_capacity(collections.len()),
        };
        for &collection in collections {
            // Dropping `controller` on error aborts workers already started.
            let subscription = store.watch(collection).await?;
            let (state, _) = watch::channel(ChannelState::Connecting);
            let state = Arc::new(state);
            let worker = tokio::spawn(run_channel(
                subscription,
                refresher.clone(),
                Arc::clone(&state),
                coalesce,
            ));
            controller.channels.push(Channel {
                collection,
                state,
                worker: Some(worker),
            });
        }
        Ok(controller)
    }

    /// Current state of `collection`'s channel, `None` if it is not watched.
    pub fn state(&self, collection: Collection) -> Option<ChannelState> {
        self.channel(collection).map(|channel| *channel.state.borrow())
    }

    pub fn watch_state(&self, collection: Collection) -> Option<watch::Receiver<ChannelState>> {
        self.channel(collection).map(|channel| channel.state.subscribe())
    }

    /// Stop every worker and release its subscription.
    pub async fn shutdown(&mut self) {
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                worker.abort();
                // Cancelled is the expected outcome.
                let _ = worker.await;
            }
            channel.state.send_replace(ChannelState::Closed);
            info!(collection = %channel.collection, "realtime channel closed");
        }
    }

    fn channel(&self, collection: Collection) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|channel| channel.collection == collection)
    }
}

impl Drop for ResyncController {
    fn drop(&mut self) {
        for channel in &mut self.channels {
            if let Some(worker) = channel.worker.take() {
                worker.abort();
            }
            channel.state.send_replace(ChannelState::Closed);
        }
    }
}

impl std::fmt::Debug for ResyncController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states: Vec<_> = self
            .channels
            .iter()
            .map(|channel| (channel.collection, *channel.state.borrow()))
            .collect();
        f.debug_struct("ResyncController")
            .field("channels", &states)
            .finish()
    }
}

/// What a batch of channel events asks for.
#[derive(Debug, Default)]
struct Pending {
    reason: Option<&'static str>,
    changes: usize,
}

impl Pending {
    fn note(&mut self, event: ChannelEvent, collection: Collection, state: &watch::Sender<ChannelState>) {
        match event {
            ChannelEvent::Subscribed => {
                info!(%collection, "realtime channel subscribed");
                state.send_replace(ChannelState::Subscribed);
                self.reason = Some("subscribed");
            }
            ChannelEvent::Change(change) => {
                debug!(%collection, kind = ?change.kind, "change notification");
                self.changes += 1;
                self.reason.get_or_insert("change");
            }
            ChannelEvent::Disconnected { reason } => {
                info!(%collection, %reason, "realtime channel disconnected; reconnecting");
                state.send_replace(ChannelState::Connecting);
                // The next join refreshes anyway.
                self.reason = None;
                self.changes = 0;
            }
        }
    }
}

async fn run_channel(
    mut subscription: Subscription,
    refresher: Refresher,
    state: Arc<watch::Sender<ChannelState>>,
    coalesce: Duration,
) {
    let collection = subscription.collection();
    while let Some(event) = subscription.next().await {
        let mut pending = Pending::default();
        pending.note(event, collection, &state);
        if pending.changes > 0 && !coalesce.is_zero() {
            tokio::time::sleep(coalesce).await;
        }
        while let Some(queued) = subscription.try_next() {
            pending.note(queued, collection, &state);
        }

        let Some(reason) = pending.reason else {
            continue;
        };
        if *state.borrow() != ChannelState::Subscribed {
            continue;
        }
        if pending.changes > 1 {
            debug!(%collection, coalesced = pending.changes, "coalesced change notifications");
        }
        refresher.refresh_logged(reason).await;
    }
    debug!(%collection, "change feed ended");
    state.send_replace(ChannelState::Closed);
}
