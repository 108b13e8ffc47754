//! 进程内文档存储
//!
//! 写入在持有写锁期间完成并向受影响的监听者投递快照，因此同一订阅内的快照
//! 顺序与写入顺序一致。监听者登记在 `DashMap` 中，句柄取消后在下一次投递时清理。
//!
//! 测试辅助：可注入时钟、写入延迟、整体不可用以及按操作/集合的写入失败。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    DocRef, Document, DocumentSnapshot, DocumentStore, Query, QuerySnapshot, Snapshot,
    StoreError, StoreEvent, StoreRef, StoreResult, Subscription, is_server_timestamp, to_document,
};

type Collections = HashMap<String, BTreeMap<String, Document>>;
type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Write operation kind, used for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Update,
    Delete,
}

struct Listener {
    target: StoreRef,
    tx: mpsc::UnboundedSender<StoreEvent>,
    cancel: CancellationToken,
}

struct Fault {
    op: WriteOp,
    collection: String,
    remaining: usize,
}

struct Inner {
    collections: RwLock<Collections>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    clock: Clock,
    available: AtomicBool,
    write_latency_ms: AtomicU64,
    faults: Mutex<Vec<Fault>>,
}

/// In-memory [`DocumentStore`]
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collections", &self.inner.collections.read().len())
            .field("listeners", &self.inner.listeners.len())
            .field("available", &self.inner.available.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// 使用系统时钟
    pub fn new() -> Self {
        Self::with_clock(shared::util::now_seconds)
    }

    /// 使用自定义时钟（秒），服务器时间戳由它生成
    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                listeners: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                clock: Arc::new(clock),
                available: AtomicBool::new(true),
                write_latency_ms: AtomicU64::new(0),
                faults: Mutex::new(Vec::new()),
            }),
        }
    }

    // ========== Test & demo helpers ==========

    /// Insert a document under a fixed id, notifying listeners
    pub fn seed<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> StoreResult<()> {
        let data = self.resolve_sentinels(to_document(value)?);
        let mut guard = self.inner.collections.write();
        let before = guard
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify(&guard, collection, id, before.as_ref());
        Ok(())
    }

    /// Current document body, bypassing listeners
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// 模拟存储整体不可用
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// 每次写入前的人为延迟
    pub fn set_write_latency(&self, latency: Option<Duration>) {
        let ms = latency.map(|d| d.as_millis() as u64).unwrap_or(0);
        self.inner.write_latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Make the next `times` writes of `op` on `collection` fail with `Unavailable`
    pub fn fail_writes(&self, op: WriteOp, collection: &str, times: usize) {
        self.inner.faults.lock().push(Fault {
            op,
            collection: collection.to_string(),
            remaining: times,
        });
    }

    /// Deliver a listener error to every listener on `collection`
    pub fn push_listener_error(&self, collection: &str, error: StoreError) {
        let _guard = self.inner.collections.read();
        for entry in self.inner.listeners.iter() {
            let listener = entry.value();
            if listener.target.collection() == collection && !listener.cancel.is_cancelled() {
                let _ = listener.tx.send(StoreEvent::Error(error.clone()));
            }
        }
    }

    /// Number of live listeners. Cancelled or closed ones are dropped first.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .retain(|_, listener| !listener.cancel.is_cancelled() && !listener.tx.is_closed());
        self.inner.listeners.len()
    }

    // ========== Internals ==========

    fn ensure_available(&self) -> StoreResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".into()))
        }
    }

    async fn before_write(&self, op: WriteOp, collection: &str) -> StoreResult<()> {
        let latency = self.inner.write_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.ensure_available()?;

        let mut faults = self.inner.faults.lock();
        if let Some(fault) = faults
            .iter_mut()
            .find(|f| f.op == op && f.collection == collection && f.remaining > 0)
        {
            fault.remaining -= 1;
            return Err(StoreError::Unavailable(format!(
                "injected {op:?} failure on {collection}"
            )));
        }
        faults.retain(|f| f.remaining > 0);
        Ok(())
    }

    fn resolve_sentinels(&self, data: Document) -> Document {
        let now = (self.inner.clock)();
        data.into_iter()
            .map(|(k, v)| (k, resolve_value(v, now)))
            .collect()
    }

    /// Send fresh snapshots to listeners affected by a write to `collection/id`.
    /// Called with the write guard held.
    fn notify(&self, data: &Collections, collection: &str, id: &str, before: Option<&Document>) {
        let after = data.get(collection).and_then(|docs| docs.get(id));
        let mut dead = Vec::new();

        for entry in self.inner.listeners.iter() {
            let listener = entry.value();
            if listener.cancel.is_cancelled() {
                dead.push(*entry.key());
                continue;
            }
            let affected = match &listener.target {
                StoreRef::Doc(d) => d.collection == collection && d.id == id,
                StoreRef::Query(q) => {
                    q.collection == collection
                        && (before.is_some_and(|b| q.matches(b)) || after.is_some_and(|a| q.matches(a)))
                }
            };
            if !affected {
                continue;
            }
            let snapshot = snapshot_of(data, &listener.target);
            if listener.tx.send(StoreEvent::Snapshot(snapshot)).is_err() {
                dead.push(*entry.key());
            }
        }

        for key in dead {
            self.inner.listeners.remove(&key);
        }
    }
}

fn resolve_value(value: Value, now: i64) -> Value {
    if is_server_timestamp(&value) {
        return serde_json::json!({ "seconds": now });
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_value(v, now)))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

fn doc_snapshot(data: &Collections, d: &DocRef) -> DocumentSnapshot {
    DocumentSnapshot {
        collection: d.collection.clone(),
        id: d.id.clone(),
        data: data.get(&d.collection).and_then(|docs| docs.get(&d.id)).cloned(),
    }
}

fn query_snapshot(data: &Collections, q: &Query) -> QuerySnapshot {
    let docs = data
        .get(&q.collection)
        .map(|docs| {
            docs.iter()
                .filter(|(_, body)| q.matches(body))
                .map(|(id, body)| DocumentSnapshot {
                    collection: q.collection.clone(),
                    id: id.clone(),
                    data: Some(body.clone()),
                })
                .collect()
        })
        .unwrap_or_default();
    QuerySnapshot { docs }
}

fn snapshot_of(data: &Collections, target: &StoreRef) -> Snapshot {
    match target {
        StoreRef::Doc(d) => Snapshot::Doc(doc_snapshot(data, d)),
        StoreRef::Query(q) => Snapshot::Query(query_snapshot(data, q)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, target: StoreRef) -> StoreResult<Subscription> {
        self.ensure_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        {
            // 持有读锁登记，保证初始快照与后续写入之间没有遗漏
            let guard = self.inner.collections.read();
            let initial = snapshot_of(&guard, &target);
            let _ = tx.send(StoreEvent::Snapshot(initial));
            let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(listener_id = id, collection = target.collection(), "Listener registered");
            self.inner.listeners.insert(
                id,
                Listener {
                    target,
                    tx,
                    cancel: cancel.clone(),
                },
            );
        }
        Ok(Subscription::new(rx, cancel))
    }

    async fn get_doc(&self, doc: &DocRef) -> StoreResult<DocumentSnapshot> {
        self.ensure_available()?;
        Ok(doc_snapshot(&self.inner.collections.read(), doc))
    }

    async fn get_once(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        self.ensure_available()?;
        Ok(query_snapshot(&self.inner.collections.read(), query))
    }

    async fn add_doc(&self, collection: &str, data: Document) -> StoreResult<String> {
        self.before_write(WriteOp::Add, collection).await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let data = self.resolve_sentinels(data);
        {
            let mut guard = self.inner.collections.write();
            guard
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), data);
            self.notify(&guard, collection, &id, None);
        }
        Ok(id)
    }

    async fn update_doc(&self, doc: &DocRef, patch: Document) -> StoreResult<()> {
        self.before_write(WriteOp::Update, &doc.collection).await?;
        let patch = self.resolve_sentinels(patch);
        {
            let mut guard = self.inner.collections.write();
            let existing = guard
                .get_mut(&doc.collection)
                .and_then(|docs| docs.get_mut(&doc.id))
                .ok_or_else(|| StoreError::NotFound(doc.path()))?;
            let before = existing.clone();
            existing.extend(patch);
            self.notify(&guard, &doc.collection, &doc.id, Some(&before));
        }
        Ok(())
    }

    async fn delete_doc(&self, doc: &DocRef) -> StoreResult<()> {
        self.before_write(WriteOp::Delete, &doc.collection).await?;
        {
            let mut guard = self.inner.collections.write();
            let before = guard
                .get_mut(&doc.collection)
                .and_then(|docs| docs.remove(&doc.id));
            if before.is_some() {
                self.notify(&guard, &doc.collection, &doc.id, before.as_ref());
            }
        }
        Ok(())
    }
}
