//! 数据存储适配层
//!
//! 工作流引擎只通过 [`DocumentStore`] 这一窄接口访问实时文档存储：
//!
//! - `subscribe(ref)`: 立即推送一次完整快照，之后每次变更推送一次，直到句柄取消或丢弃
//! - `get_doc` / `get_once`: 一次性读取
//! - `add_doc` / `update_doc` / `delete_doc`: 写入，完成后才返回
//!
//! 快照按写入顺序投递；不同集合之间不保证顺序。
//! [`MemoryStore`] 是进程内实现，供演示和测试使用。

pub mod live;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use shared::models::{AttendanceLog, Deduction, DeletionRequest, Request, User};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use live::{LiveCollection, LiveState, RecordFilter};
pub use memory::{MemoryStore, WriteOp};

/// Document body
pub type Document = Map<String, Value>;

/// Server timestamp sentinel key
pub const SERVER_TIMESTAMP_KEY: &str = ".sv";

/// 写入时由存储替换为 `{ "seconds": <now> }`
pub fn server_timestamp() -> Value {
    let mut sentinel = Map::new();
    sentinel.insert(SERVER_TIMESTAMP_KEY.into(), Value::from("timestamp"));
    Value::Object(sentinel)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(SERVER_TIMESTAMP_KEY) == Some(&Value::from("timestamp")))
}

// ========== Errors ==========

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 给存储调用加超时
pub async fn timed<T, F>(timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

/// Serialize a write payload into a document body
pub fn to_document<T: Serialize>(payload: &T) -> StoreResult<Document> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::InvalidPayload(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(StoreError::InvalidPayload(e.to_string())),
    }
}

// ========== References ==========

/// Reference to a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// Collection query with optional equality filters
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
}

impl Query {
    /// Add an equality filter on a top-level field
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

pub fn doc(collection: impl Into<String>, id: impl Into<String>) -> DocRef {
    DocRef {
        collection: collection.into(),
        id: id.into(),
    }
}

pub fn collection(name: impl Into<String>) -> Query {
    Query {
        collection: name.into(),
        filters: Vec::new(),
    }
}

/// Listen target
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRef {
    Doc(DocRef),
    Query(Query),
}

impl StoreRef {
    pub fn collection(&self) -> &str {
        match self {
            StoreRef::Doc(d) => &d.collection,
            StoreRef::Query(q) => &q.collection,
        }
    }
}

impl From<DocRef> for StoreRef {
    fn from(d: DocRef) -> Self {
        StoreRef::Doc(d)
    }
}

impl From<Query> for StoreRef {
    fn from(q: Query) -> Self {
        StoreRef::Query(q)
    }
}

// ========== Snapshots ==========

/// Decodable record whose id comes from the snapshot key
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    fn set_id(&mut self, id: String);
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub collection: String,
    pub id: String,
    /// `None` when the document does not exist
    pub data: Option<Document>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Top-level string field, e.g. `userId`
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }

    /// Decode into a record. Missing documents decode to `NotFound`.
    pub fn decode<T: Record>(&self) -> StoreResult<T> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| StoreError::NotFound(self.path()))?;
        let mut record: T = serde_json::from_value(Value::Object(data.clone())).map_err(|e| {
            StoreError::Decode {
                path: self.path(),
                message: e.to_string(),
            }
        })?;
        record.set_id(self.id.clone());
        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    /// Existing documents, ordered by id
    pub docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Doc(DocumentSnapshot),
    Query(QuerySnapshot),
}

/// Item delivered on a subscription
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Snapshot(Snapshot),
    Error(StoreError),
}

// ========== Subscription ==========

/// Listener handle. Dropping it cancels the listener.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StoreEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<StoreEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next event; `None` once the listener is cancelled or the store dropped it
    pub async fn next(&mut self) -> Option<StoreEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ========== Store trait ==========

/// 实时文档存储接口
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Listen to a document or query
    async fn subscribe(&self, target: StoreRef) -> StoreResult<Subscription>;

    /// One-shot document read
    async fn get_doc(&self, doc: &DocRef) -> StoreResult<DocumentSnapshot>;

    /// One-shot query read
    async fn get_once(&self, query: &Query) -> StoreResult<QuerySnapshot>;

    /// Create a document with a generated id
    async fn add_doc(&self, collection: &str, data: Document) -> StoreResult<String>;

    /// Merge `patch` into an existing document
    async fn update_doc(&self, doc: &DocRef, patch: Document) -> StoreResult<()>;

    /// Delete a document; deleting a missing document succeeds
    async fn delete_doc(&self, doc: &DocRef) -> StoreResult<()>;
}

// ========== Records ==========

impl Record for Request {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for DeletionRequest {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for AttendanceLog {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Deduction {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// User documents are keyed by uid; the body copy wins when present
impl Record for User {
    fn set_id(&mut self, id: String) {
        if self.uid.is_empty() {
            self.uid = id;
        }
    }
}
