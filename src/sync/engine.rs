use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::status::{SyncPhase, SyncStatus};
use crate::api::backend::RemoteStore;
use crate::api::types::RemoteRecord;
use crate::error::{ErrorInfo, KeepsakeError, Result};
use crate::state::{AppState, AppStore, CoupleId, Identity};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Cloud payload of a document plus its serialized form, which is what
/// gets compared against the last synced baseline.
#[derive(Debug, Clone)]
struct Snapshot {
    payload: serde_json::Value,
    serialized: String,
}

impl Snapshot {
    fn of(state: &AppState) -> Result<Self> {
        let payload = state.cloud_payload()?;
        let serialized = payload.to_string();
        Ok(Self {
            payload,
            serialized,
        })
    }
}

enum SyncMessage {
    DebounceElapsed {
        ticket: u64,
    },
    Loaded {
        generation: u64,
        baseline: Option<String>,
        result: Result<RemoteRecord>,
    },
    Created {
        snapshot: Snapshot,
        result: Result<CoupleId>,
    },
    Saved {
        target: CoupleId,
        snapshot: Snapshot,
        result: Result<()>,
    },
    Settled(oneshot::Sender<SyncStatus>),
    Shutdown,
}

/// Mirrors the local document to a [`RemoteStore`].
///
/// Identifier changes trigger a one-shot load; document changes are
/// debounced and pushed as a create (no identifier yet) or an update.
/// Pushes never overlap a load or another push: one that comes due while
/// the engine is busy waits until it is idle again.
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    store: AppStore,
    identity: Identity,
    debounce: Duration,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteStore>, store: AppStore, identity: Identity) -> Self {
        Self {
            remote,
            store,
            identity,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn spawn(self) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let worker = Worker {
            couple_id: None,
            remote: self.remote,
            store: self.store,
            identity: self.identity,
            debounce: self.debounce,
            tx: tx.downgrade(),
            status: status_tx,
            loading: None,
            saving: false,
            generation: 0,
            adopted: None,
            last_synced: None,
            last_synced_at: None,
            last_error: None,
            pending: None,
            due: false,
            timer: None,
            ticket: 0,
            waiters: Vec::new(),
        };
        let task = tokio::spawn(worker.run(rx));
        SyncHandle {
            tx,
            status: status_rx,
            task,
        }
    }
}

pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncMessage>,
    status: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Resolves once nothing is loading, saving or waiting to be pushed.
    pub async fn settled(&self) -> SyncStatus {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SyncMessage::Settled(reply)).is_err() {
            return self.status();
        }
        rx.await.unwrap_or_else(|_| self.status())
    }

    pub async fn shutdown(self) {
        let _ = self.tx.send(SyncMessage::Shutdown);
        let _ = self.task.await;
    }
}

struct Worker {
    remote: Arc<dyn RemoteStore>,
    store: AppStore,
    identity: Identity,
    debounce: Duration,
    tx: mpsc::WeakUnboundedSender<SyncMessage>,
    status: watch::Sender<SyncStatus>,

    couple_id: Option<CoupleId>,
    /// Generation of the load in flight
    loading: Option<u64>,
    saving: bool,
    generation: u64,
    /// Identifier we just created; its change notification must not load.
    adopted: Option<CoupleId>,
    last_synced: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<ErrorInfo>,
    pending: Option<Snapshot>,
    /// The debounce window closed while busy
    due: bool,
    timer: Option<JoinHandle<()>>,
    ticket: u64,
    waiters: Vec<oneshot::Sender<SyncStatus>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncMessage>) {
        let mut state_rx = self.store.subscribe();
        let mut id_rx = self.identity.subscribe();
        self.couple_id = id_rx.borrow().clone();

        if let Some(id) = self.couple_id.clone() {
            self.start_load(id);
        }
        self.on_state_changed();
        self.publish();

        loop {
            tokio::select! {
                biased;
                Ok(()) = state_rx.changed() => self.on_state_changed(),
                Ok(()) = id_rx.changed() => {
                    let id = id_rx.borrow().clone();
                    self.on_identity_changed(id);
                }
                msg = rx.recv() => match msg {
                    None | Some(SyncMessage::Shutdown) => break,
                    Some(msg) => self.handle(msg),
                },
            }
            self.publish();
        }

        self.cancel_timer();
        tracing::debug!("sync engine stopped");
    }

    fn phase(&self) -> SyncPhase {
        if self.loading.is_some() {
            SyncPhase::Loading
        } else if self.saving {
            SyncPhase::Saving
        } else {
            SyncPhase::Idle
        }
    }

    fn busy(&self) -> bool {
        self.phase() != SyncPhase::Idle
    }

    fn publish(&mut self) {
        let status = SyncStatus {
            phase: self.phase(),
            pending: self.pending.is_some(),
            last_synced_at: self.last_synced_at,
            last_error: self.last_error.clone(),
        };
        if status.is_settled() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(status.clone());
            }
        }
        self.status.send_replace(status);
    }

    fn handle(&mut self, msg: SyncMessage) {
        match msg {
            SyncMessage::DebounceElapsed { ticket } => {
                if ticket != self.ticket {
                    return;
                }
                self.timer = None;
                if self.busy() {
                    self.due = true;
                } else {
                    self.push();
                }
            }
            SyncMessage::Loaded {
                generation,
                baseline,
                result,
            } => {
                if self.loading != Some(generation) {
                    tracing::debug!(generation, "discarding superseded load");
                    return;
                }
                self.loading = None;
                match result {
                    Ok(record) => self.apply_loaded(record, baseline),
                    Err(e) => {
                        self.fail("load", e);
                        self.keep_only_edits_since(baseline.as_deref());
                    }
                }
                self.resume();
            }
            SyncMessage::Created { snapshot, result } => {
                self.saving = false;
                match result {
                    Ok(id) if self.couple_id.is_none() => {
                        tracing::info!(couple_id = %id, "created cloud copy");
                        self.couple_id = Some(id.clone());
                        self.adopted = Some(id.clone());
                        if let Err(e) = self.identity.set(id) {
                            tracing::warn!(error = %e, "could not persist new couple id");
                        }
                        self.mark_synced(snapshot);
                    }
                    Ok(id) => {
                        tracing::warn!(couple_id = %id, "identifier changed while creating; dropping new record");
                    }
                    Err(e) => self.fail("create", e),
                }
                self.resume();
            }
            SyncMessage::Saved {
                target,
                snapshot,
                result,
            } => {
                self.saving = false;
                match result {
                    Ok(()) if self.couple_id.as_ref() == Some(&target) => self.mark_synced(snapshot),
                    Ok(()) => {}
                    Err(e) => self.fail("update", e),
                }
                self.resume();
            }
            SyncMessage::Settled(reply) => self.waiters.push(reply),
            SyncMessage::Shutdown => {}
        }
    }

    fn on_state_changed(&mut self) {
        let state = self.store.get();
        if !state.onboarded {
            return;
        }
        let snapshot = match Snapshot::of(&state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fail("serialize", e);
                return;
            }
        };
        if self.last_synced.as_deref() == Some(snapshot.serialized.as_str()) {
            // Back to what the cloud already holds
            self.pending = None;
            self.cancel_timer();
            return;
        }
        self.pending = Some(snapshot);
        self.restart_timer();
    }

    fn on_identity_changed(&mut self, id: Option<CoupleId>) {
        if let Some(adopted) = self.adopted.take() {
            if id.as_ref() == Some(&adopted) {
                return;
            }
        }
        if id == self.couple_id {
            return;
        }
        tracing::info!(couple_id = ?id, "couple identifier changed");
        self.couple_id = id.clone();
        self.last_synced = None;
        self.loading = None;
        if let Some(id) = id {
            self.start_load(id);
        }
        self.on_state_changed();
    }

    fn start_load(&mut self, id: CoupleId) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.generation += 1;
        let generation = self.generation;
        self.loading = Some(generation);
        let baseline = Snapshot::of(&self.store.get()).ok().map(|s| s.serialized);
        let remote = Arc::clone(&self.remote);
        tracing::debug!(couple_id = %id, generation, "loading cloud copy");
        tokio::spawn(async move {
            let result = remote.load(&id).await;
            let _ = tx.send(SyncMessage::Loaded {
                generation,
                baseline,
                result,
            });
        });
    }

    fn apply_loaded(&mut self, record: RemoteRecord, baseline: Option<String>) {
        let unchanged = |current: &AppState| {
            Snapshot::of(current).ok().map(|s| s.serialized) == baseline
        };
        match self.store.apply_remote(&record.data, unchanged) {
            Ok(true) => {
                // The cloud copy supersedes whatever was queued before the load
                self.pending = None;
                self.cancel_timer();
                match Snapshot::of(&self.store.get()) {
                    Ok(merged) => self.last_synced = Some(merged.serialized),
                    Err(e) => self.fail("serialize", e),
                }
                self.last_synced_at = record.updated_at.or_else(|| Some(Utc::now()));
                self.last_error = None;
                tracing::info!("merged cloud copy into local state");
                self.on_state_changed();
            }
            Ok(false) => {
                tracing::info!("local edits made during load take precedence");
            }
            Err(e) => self.fail("merge", e),
        }
    }

    /// After a failed load the cloud copy is unknown: the local document
    /// may only be pushed if it was edited while the load was running.
    fn keep_only_edits_since(&mut self, baseline: Option<&str>) {
        let current = Snapshot::of(&self.store.get()).ok().map(|s| s.serialized);
        if current.as_deref() == baseline {
            self.pending = None;
            self.cancel_timer();
        }
    }

    /// Push whatever came due while a load or push was in flight.
    fn resume(&mut self) {
        if self.due && !self.busy() {
            self.due = false;
            self.push();
        }
    }

    fn push(&mut self) {
        let Some(snapshot) = self.pending.take() else {
            return;
        };
        if self.last_synced.as_deref() == Some(snapshot.serialized.as_str()) {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.saving = true;
        let remote = Arc::clone(&self.remote);
        match self.couple_id.clone() {
            Some(target) => {
                tracing::debug!(couple_id = %target, "pushing update");
                tokio::spawn(async move {
                    let result = remote.update(&target, &snapshot.payload).await;
                    let _ = tx.send(SyncMessage::Saved {
                        target,
                        snapshot,
                        result,
                    });
                });
            }
            None => {
                tracing::debug!("creating cloud copy");
                tokio::spawn(async move {
                    let result = remote.create(&snapshot.payload).await;
                    let _ = tx.send(SyncMessage::Created { snapshot, result });
                });
            }
        }
    }

    fn mark_synced(&mut self, snapshot: Snapshot) {
        self.last_synced = Some(snapshot.serialized);
        self.last_synced_at = Some(Utc::now());
        self.last_error = None;
    }

    fn fail(&mut self, op: &str, e: KeepsakeError) {
        tracing::warn!(op, error = %e, "cloud sync failed; keeping local state");
        self.last_error = Some(ErrorInfo::from_error(&e));
    }

    fn restart_timer(&mut self) {
        self.cancel_timer();
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        self.ticket += 1;
        let ticket = self.ticket;
        let delay = self.debounce;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncMessage::DebounceElapsed { ticket });
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.due = false;
    }
}
