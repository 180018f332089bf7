//! Optimistic state cache.
//!
//! Holds the last snapshot confirmed by the store and a working snapshot that
//! the presentation layer renders. The working snapshot is always
//! `confirmed` with the pending local mutations replayed on top, so discarding
//! local edits is a pointer swap and a fresh server snapshot can be adopted
//! without losing edits that are still in flight.
//!
//! Confirmations are matched by provisional id (creates) or mutation id
//! (everything else), never by the order responses arrive in.
//!
//! While a create is in flight a fresh snapshot may already hold the row it
//! is creating, with no way to pair the two until the store replies. Such
//! resyncs are parked and adopted once no create is outstanding.

use crate::error::{BoardError, BoardResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use taskboard_core::{BoardEntity, BoardSnapshot, Mutation, ProvisionalId, RecordKey, SnapshotDiff};
use tokio::sync::watch;
use tracing::debug;

/// Handle for acknowledging one optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u64);

/// Sequence number taken before listing the store.
///
/// Resyncs carrying an older ticket than the last applied one are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Result of reconciling a create with the store's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The provisional entry now carries the server-confirmed entity.
    Committed,
    /// The entity was deleted locally before the store confirmed it. The
    /// server row still exists and should be deleted.
    DiscardedLocally,
    /// No pending entry for that id (rolled back or cache closed).
    Missing,
}

/// What [`OptimisticCache::resync`] did with a fetched snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The snapshot is now the confirmed state.
    Applied,
    /// A create is in flight; the snapshot is held until it settles.
    Deferred,
    /// A newer fetch already landed or is parked.
    Stale,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingState {
    InFlight,
    /// Confirmed by the store while `after_fetch` was the newest ticket.
    Acknowledged { after_fetch: u64 },
}

#[derive(Debug, Clone)]
struct PendingEntry {
    id: MutationId,
    mutation: Mutation,
    state: PendingState,
}

#[derive(Debug)]
struct CacheState {
    confirmed: Arc<BoardSnapshot>,
    working: Arc<BoardSnapshot>,
    pending: Vec<PendingEntry>,
    /// Provisional creates deleted locally while their create was in flight.
    discarded: HashSet<ProvisionalId>,
    /// Newest resync held back while a create was in flight.
    deferred: Option<(u64, Arc<BoardSnapshot>)>,
    next_mutation: u64,
    issued_fetch: u64,
    applied_fetch: u64,
    closed: bool,
}

impl CacheState {
    fn rebuild(&mut self) {
        self.working = Arc::new(
            self.confirmed
                .replay(self.pending.iter().map(|entry| &entry.mutation)),
        );
    }

    fn creates_in_flight(&self) -> bool {
        self.pending.iter().any(|entry| {
            entry.state == PendingState::InFlight && entry.mutation.created_provisional().is_some()
        })
    }

    /// Make `snapshot` the confirmed state and drop acknowledged edits it
    /// already reflects. Does not rebuild `working`.
    fn adopt(&mut self, ticket: u64, snapshot: Arc<BoardSnapshot>) {
        self.applied_fetch = ticket;
        self.confirmed = snapshot;
        self.pending.retain(|entry| match entry.state {
            PendingState::InFlight => true,
            PendingState::Acknowledged { after_fetch } => after_fetch >= ticket,
        });
    }

    /// Adopt the parked resync once no create is outstanding.
    fn release_deferred(&mut self) {
        if self.creates_in_flight() {
            return;
        }
        if let Some((ticket, snapshot)) = self.deferred.take() {
            debug!(ticket, "adopting deferred resync");
            self.adopt(ticket, snapshot);
        }
    }
}

pub struct OptimisticCache {
    state: Mutex<CacheState>,
    working_tx: watch::Sender<Arc<BoardSnapshot>>,
}

impl OptimisticCache {
    pub fn new() -> Self {
        Self::with_snapshot(BoardSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: BoardSnapshot) -> Self {
        let snapshot = Arc::new(snapshot);
        let (working_tx, _) = watch::channel(Arc::clone(&snapshot));
        Self {
            state: Mutex::new(CacheState {
                confirmed: Arc::clone(&snapshot),
                working: snapshot,
                pending: Vec::new(),
                discarded: HashSet::new(),
                deferred: None,
                next_mutation: 1,
                issued_fetch: 0,
                applied_fetch: 0,
                closed: false,
            }),
            working_tx,
        }
    }

    /// The snapshot to render: confirmed state plus pending local edits.
    pub fn working(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.lock().working)
    }

    /// The last snapshot fetched from the store. Not for rendering.
    pub fn confirmed(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.lock().confirmed)
    }

    /// Receive every new working snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardSnapshot>> {
        self.working_tx.subscribe()
    }

    /// Apply a local edit to the working snapshot before the store sees it.
    pub fn apply_optimistic(&self, mutation: Mutation) -> BoardResult<MutationId> {
        let mut state = self.lock();
        if state.closed {
            return Err(BoardError::Closed);
        }
        let id = MutationId(state.next_mutation);
        state.next_mutation += 1;

        if let Some(RecordKey::Provisional(provisional)) = mutation.removed_key() {
            // Deleting something the store has not confirmed: drop its create.
            state
                .pending
                .retain(|entry| entry.mutation.created_provisional() != Some(provisional));
            state.discarded.insert(provisional);
            state.release_deferred();
            debug!(%provisional, "discarded unconfirmed entity");
        } else {
            debug!(mutation = mutation.label(), pending = state.pending.len() + 1, "optimistic apply");
            state.pending.push(PendingEntry {
                id,
                mutation,
                state: PendingState::InFlight,
            });
        }
        state.rebuild();
        self.publish(&state);
        Ok(id)
    }

    /// Replace a provisional entity with the store's confirmed version,
    /// keeping its place in the list.
    pub fn commit(&self, provisional: ProvisionalId, entity: BoardEntity) -> CommitOutcome {
        let mut state = self.lock();
        if state.closed {
            return CommitOutcome::Missing;
        }
        if state.discarded.remove(&provisional) {
            return CommitOutcome::DiscardedLocally;
        }

        let after_fetch = state.issued_fetch;
        let Some(entry) = state
            .pending
            .iter_mut()
            .find(|entry| entry.mutation.created_provisional() == Some(provisional))
        else {
            debug!(%provisional, "commit for an entry that no longer exists");
            return CommitOutcome::Missing;
        };
        entry.mutation = Mutation::insert(entity);
        entry.state = PendingState::Acknowledged { after_fetch };
        debug!(%provisional, "committed provisional entity");

        state.release_deferred();
        state.rebuild();
        self.publish(&state);
        CommitOutcome::Committed
    }

    /// Mark a non-create mutation as accepted by the store.
    ///
    /// The edit stays visible until a resync whose fetch began afterwards.
    pub fn acknowledge(&self, id: MutationId) {
        let mut state = self.lock();
        let after_fetch = state.issued_fetch;
        if let Some(entry) = state.pending.iter_mut().find(|entry| entry.id == id) {
            entry.state = PendingState::Acknowledged { after_fetch };
        }
    }

    /// Discard every pending local mutation.
    pub fn rollback(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        debug!(discarded = state.pending.len(), "rollback to confirmed snapshot");
        state.pending.clear();
        state.release_deferred();
        state.working = Arc::clone(&state.confirmed);
        self.publish(&state);
    }

    /// Forget a locally-deleted provisional id whose create failed.
    pub fn forget_provisional(&self, provisional: ProvisionalId) {
        self.lock().discarded.remove(&provisional);
    }

    /// Take a ticket before listing the store for a resync.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut state = self.lock();
        state.issued_fetch += 1;
        FetchTicket(state.issued_fetch)
    }

    /// Adopt a freshly fetched snapshot as the confirmed state.
    ///
    /// Acknowledged mutations the fetch already reflects are dropped; those
    /// still in flight are replayed on top. While a create is in flight the
    /// snapshot is parked instead and adopted when the last create commits
    /// or is rolled back.
    pub fn resync(&self, ticket: FetchTicket, snapshot: BoardSnapshot) -> ResyncOutcome {
        let mut state = self.lock();
        if state.closed {
            return ResyncOutcome::Closed;
        }
        let newest = state
            .deferred
            .as_ref()
            .map_or(state.applied_fetch, |(parked, _)| (*parked).max(state.applied_fetch));
        if ticket.0 <= newest {
            debug!(ticket = ticket.0, newest, "stale resync ignored");
            return ResyncOutcome::Stale;
        }
        if state.creates_in_flight() {
            debug!(ticket = ticket.0, "create in flight; resync deferred");
            state.deferred = Some((ticket.0, Arc::new(snapshot)));
            return ResyncOutcome::Deferred;
        }
        state.deferred = None;
        state.adopt(ticket.0, Arc::new(snapshot));
        state.rebuild();
        debug!(
            ticket = ticket.0,
            columns = state.confirmed.columns().len(),
            tasks = state.confirmed.tasks().len(),
            pending = state.pending.len(),
            "resync applied"
        );
        self.publish(&state);
        ResyncOutcome::Applied
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// What the working snapshot currently adds on top of the confirmed one.
    pub fn pending_diff(&self) -> SnapshotDiff {
        let state = self.lock();
        SnapshotDiff::between(&state.confirmed, &state.working)
    }

    /// Stop accepting updates. Later calls from in-flight work are ignored.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending.clear();
        state.discarded.clear();
        state.deferred = None;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CacheState) {
        self.working_tx.send_replace(Arc::clone(&state.working));
    }
}

impl Default for OptimisticCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OptimisticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("OptimisticCache")
            .field("pending", &state.pending.len())
            .field("applied_fetch", &state.applied_fetch)
            .field("deferred", &state.deferred.as_ref().map(|(ticket, _)| *ticket))
            .field("closed", &state.closed)
            .finish()
    }
}
