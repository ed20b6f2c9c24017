//! The remote document store seen through listen/write primitives.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc;

use super::SyncError;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A live query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub path: String,
    pub order_by: String,
    pub direction: Direction,
}

impl CollectionQuery {
    pub fn new(path: impl Into<String>, order_by: impl Into<String>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            order_by: order_by.into(),
            direction,
        }
    }
}

/// Cancels a listener when invoked or dropped.
pub struct ListenerRegistration {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ListenerRegistration {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Snapshots of a query, each one the complete ordered result set.
pub struct SnapshotStream {
    pub snapshots: mpsc::UnboundedReceiver<Vec<Document>>,
    pub registration: ListenerRegistration,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a live query. The current result set is delivered first, then
    /// one snapshot per change.
    async fn listen(&self, query: CollectionQuery) -> Result<SnapshotStream, SyncError>;

    async fn set(&self, path: &str, id: &str, data: Value) -> Result<(), SyncError>;

    async fn delete(&self, path: &str, id: &str) -> Result<(), SyncError>;

    async fn delete_all(&self, path: &str) -> Result<(), SyncError>;
}

struct Listener {
    query: CollectionQuery,
    tx: mpsc::UnboundedSender<Vec<Document>>,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl Inner {
    fn snapshot(&self, query: &CollectionQuery) -> Vec<Document> {
        let collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut docs: Vec<Document> = collections
            .get(&query.path)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        docs.sort_by(|a, b| {
            let ord = compare_field(a.data.get(&query.order_by), b.data.get(&query.order_by));
            match query.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
        docs
    }

    fn notify(&self, path: &str) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, listener| {
            if listener.query.path != path {
                return true;
            }
            listener.tx.send(self.snapshot(&listener.query)).is_ok()
        });
    }
}

/// Timestamps compare chronologically, numbers numerically, anything else as
/// text. Missing fields sort first.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (
                chrono::DateTime::parse_from_rfc3339(a),
                chrono::DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

/// In-process document store with live queries.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-sends the current result set to every listener on `path`.
    pub fn redeliver(&self, path: &str) {
        self.inner.notify(path);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn listen(&self, query: CollectionQuery) -> Result<SnapshotStream, SyncError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener.fetch_add(1, AtomicOrdering::Relaxed);

        tx.send(self.inner.snapshot(&query))
            .map_err(|e| SyncError::Store(e.to_string()))?;

        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Listener { query, tx });

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let registration = ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        });

        Ok(SnapshotStream {
            snapshots: rx,
            registration,
        })
    }

    async fn set(&self, path: &str, id: &str, data: Value) -> Result<(), SyncError> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.inner.notify(path);
        Ok(())
    }

    async fn delete(&self, path: &str, id: &str) -> Result<(), SyncError> {
        if let Some(docs) = self
            .inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(path)
        {
            docs.remove(id);
        }
        self.inner.notify(path);
        Ok(())
    }

    async fn delete_all(&self, path: &str) -> Result<(), SyncError> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        self.inner.notify(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn listen_delivers_current_then_changes_in_order() {
        let store = MemoryDocumentStore::new();
        store
            .set("c", "late", json!({"ts": "2026-01-02T00:00:00Z"}))
            .await
            .unwrap();
        store
            .set("c", "early", json!({"ts": "2026-01-01T00:00:00.500Z"}))
            .await
            .unwrap();

        let mut stream = store
            .listen(CollectionQuery::new("c", "ts", Direction::Ascending))
            .await
            .unwrap();

        let first = stream.snapshots.recv().await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        store.delete("c", "early").await.unwrap();
        let second = stream.snapshots.recv().await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn cancelling_registration_removes_listener() {
        let store = MemoryDocumentStore::new();
        let stream = store
            .listen(CollectionQuery::new("c", "ts", Direction::Descending))
            .await
            .unwrap();
        assert_eq!(store.listener_count(), 1);

        stream.registration.cancel();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn fractional_timestamps_compare_chronologically() {
        let a = json!("2026-01-01T00:00:00Z");
        let b = json!("2026-01-01T00:00:00.5Z");
        assert_eq!(compare_field(Some(&a), Some(&b)), Ordering::Less);
    }
}
