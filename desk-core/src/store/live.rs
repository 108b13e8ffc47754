//! 实时集合视图
//!
//! `LiveCollection` 订阅一个查询，解码文档、按作用域过滤后通过 `watch` 通道发布。
//! 每次 `activate` / `deactivate` 都会递增代数 (generation)，旧代的监听任务被取消，
//! 即使旧快照晚到也不会覆盖当前状态：写入状态前在 watch 锁内比较代数。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{
    DocumentSnapshot, DocumentStore, Query, Record, Snapshot, StoreError, StoreEvent,
    StoreResult, Subscription,
};

/// Scope filter applied to every decoded snapshot
pub type RecordFilter<T> = Arc<dyn Fn(Vec<T>) -> Vec<T> + Send + Sync>;

/// Published state of a live collection
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState<T> {
    /// Activation this state belongs to
    pub generation: u64,
    pub items: Vec<T>,
    /// At least one snapshot has been applied for this generation
    pub loaded: bool,
    /// Last listener error; items keep their last good value
    pub error: Option<StoreError>,
}

impl<T> LiveState<T> {
    fn empty(generation: u64) -> Self {
        Self {
            generation,
            items: Vec::new(),
            loaded: false,
            error: None,
        }
    }
}

/// Subscribed, scope-filtered view over one collection
pub struct LiveCollection<T: Record> {
    label: &'static str,
    store: Arc<dyn DocumentStore>,
    generation: AtomicU64,
    state: Arc<watch::Sender<LiveState<T>>>,
    active: Mutex<Option<CancellationToken>>,
}

impl<T: Record> fmt::Debug for LiveCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LiveCollection")
            .field("label", &self.label)
            .field("generation", &state.generation)
            .field("items", &state.items.len())
            .field("loaded", &state.loaded)
            .finish()
    }
}

impl<T: Record> LiveCollection<T> {
    pub fn new(label: &'static str, store: Arc<dyn DocumentStore>) -> Self {
        let (state, _) = watch::channel(LiveState::empty(0));
        Self {
            label,
            store,
            generation: AtomicU64::new(0),
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    /// Start (or restart) listening to `query`, returning the new generation.
    ///
    /// The previous listener, if any, is cancelled first and its late snapshots
    /// are discarded.
    pub async fn activate(&self, query: Query, filter: RecordFilter<T>) -> StoreResult<u64> {
        let (generation, token) = self.begin();

        let subscription = match self.store.subscribe(query.into()).await {
            Ok(sub) => sub,
            Err(e) => {
                tracing::warn!(collection = self.label, generation, error = %e, "Failed to subscribe");
                apply_error(&self.state, generation, e.clone());
                return Err(e);
            }
        };

        if token.is_cancelled() {
            tracing::debug!(collection = self.label, generation, "Activation superseded before listening");
            return Ok(generation);
        }

        tokio::spawn(pump(
            self.label,
            generation,
            subscription,
            filter,
            self.state.clone(),
            token,
        ));
        tracing::debug!(collection = self.label, generation, "Live collection activated");
        Ok(generation)
    }

    /// Cancel the listener and clear the published items
    pub fn deactivate(&self) {
        let mut active = self.active.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(token) = active.take() {
            token.cancel();
        }
        self.state.send_replace(LiveState::empty(generation));
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut active = self.active.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = active.take() {
            old.cancel();
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        self.state.send_replace(LiveState::empty(generation));
        (generation, token)
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState<T>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LiveState<T> {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    #[cfg(test)]
    pub(crate) fn apply(&self, generation: u64, snapshot: Snapshot, filter: &RecordFilter<T>) -> bool {
        apply_snapshot(self.label, &self.state, generation, snapshot, filter)
    }
}

impl<T: Record> Drop for LiveCollection<T> {
    fn drop(&mut self) {
        if let Some(token) = self.active.lock().take() {
            token.cancel();
        }
    }
}

async fn pump<T: Record>(
    label: &'static str,
    generation: u64,
    mut subscription: Subscription,
    filter: RecordFilter<T>,
    state: Arc<watch::Sender<LiveState<T>>>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = subscription.next() => event,
        };
        match event {
            Some(StoreEvent::Snapshot(snapshot)) => {
                apply_snapshot(label, &state, generation, snapshot, &filter);
            }
            Some(StoreEvent::Error(e)) => {
                tracing::warn!(collection = label, generation, error = %e, "Listener error");
                apply_error(&state, generation, e);
            }
            None => break,
        }
    }
    tracing::debug!(collection = label, generation, "Live collection listener stopped");
}

/// 解码快照中的文档；无法解码的记录跳过并告警
fn decode_all<T: Record>(label: &str, docs: &[DocumentSnapshot]) -> Vec<T> {
    docs.iter()
        .filter(|d| d.exists())
        .filter_map(|d| match d.decode::<T>() {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(collection = label, doc_id = %d.id, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

fn apply_snapshot<T: Record>(
    label: &str,
    state: &watch::Sender<LiveState<T>>,
    generation: u64,
    snapshot: Snapshot,
    filter: &RecordFilter<T>,
) -> bool {
    let docs = match snapshot {
        Snapshot::Query(q) => q.docs,
        Snapshot::Doc(d) => vec![d],
    };
    let items = filter(decode_all(label, &docs));

    let applied = state.send_if_modified(|current| {
        if current.generation != generation {
            return false;
        }
        current.items = items;
        current.loaded = true;
        current.error = None;
        true
    });
    if !applied {
        tracing::debug!(collection = label, generation, "Discarding snapshot from superseded generation");
    }
    applied
}

fn apply_error<T>(state: &watch::Sender<LiveState<T>>, generation: u64, error: StoreError) {
    state.send_if_modified(|current| {
        if current.generation != generation {
            return false;
        }
        current.error = Some(error);
        true
    });
}
