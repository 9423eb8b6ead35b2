use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::DocEntity;
use crate::error::Result;

/// Kind of change observed on a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocChangeKind {
    Inserted,
    Updated,
    Removed,
}

/// One observed document change
#[derive(Debug, Clone)]
pub struct DocChange<T: DocEntity> {
    pub kind: DocChangeKind,
    pub id: T::Id,
    /// The document after the change; absent for removals
    pub doc: Option<T>,
}

/// One typed collection of the document store. Reads return clones; writes
/// notify subscribers. Every method is an await point: inside a queued
/// operation a store call suspends the whole operation, and the
/// serialization queue guarantees nothing else interleaves for the same
/// aggregate during that suspension.
#[derive(Debug)]
pub struct Collection<T: DocEntity> {
    docs: Arc<RwLock<HashMap<T::Id, T>>>,
    changes: broadcast::Sender<DocChange<T>>,
}

impl<T: DocEntity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            docs: Arc::clone(&self.docs),
            changes: self.changes.clone(),
        }
    }
}

impl<T: DocEntity> Default for Collection<T> {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(crate::constants::EVENT_CHANNEL_CAPACITY);
        Self {
            docs: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }
}

impl<T: DocEntity> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_one(&self, id: &T::Id) -> Result<Option<T>> {
        Ok(self.docs.read().get(id).cloned())
    }

    pub async fn find(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        Ok(self
            .docs
            .read()
            .values()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.docs.read().len())
    }

    /// Upsert a document. Flushes replay the cache's final desired state, so
    /// writing an already-present id is an update, not an error.
    pub async fn insert(&self, doc: T) -> Result<()> {
        let id = doc.doc_id();
        let kind = {
            let mut docs = self.docs.write();
            let kind = if docs.contains_key(&id) {
                DocChangeKind::Updated
            } else {
                DocChangeKind::Inserted
            };
            docs.insert(id.clone(), doc.clone());
            kind
        };
        self.notify(DocChange {
            kind,
            id,
            doc: Some(doc),
        });
        Ok(())
    }

    /// Mutate a document in place; returns whether it existed
    pub async fn update(&self, id: &T::Id, mutate: impl FnOnce(&mut T)) -> Result<bool> {
        let updated = {
            let mut docs = self.docs.write();
            match docs.get_mut(id) {
                Some(doc) => {
                    mutate(doc);
                    Some(doc.clone())
                }
                None => None,
            }
        };
        match updated {
            Some(doc) => {
                self.notify(DocChange {
                    kind: DocChangeKind::Updated,
                    id: id.clone(),
                    doc: Some(doc),
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn remove(&self, id: &T::Id) -> Result<bool> {
        let removed = self.docs.write().remove(id).is_some();
        if removed {
            self.notify(DocChange {
                kind: DocChangeKind::Removed,
                id: id.clone(),
                doc: None,
            });
        }
        Ok(removed)
    }

    pub async fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> Result<usize> {
        let removed_ids: Vec<T::Id> = {
            let mut docs = self.docs.write();
            let ids: Vec<T::Id> = docs
                .values()
                .filter(|doc| predicate(doc))
                .map(DocEntity::doc_id)
                .collect();
            for id in &ids {
                docs.remove(id);
            }
            ids
        };
        let count = removed_ids.len();
        for id in removed_ids {
            self.notify(DocChange {
                kind: DocChangeKind::Removed,
                id,
                doc: None,
            });
        }
        Ok(count)
    }

    /// Subscribe to this collection's change feed
    pub fn subscribe(&self) -> broadcast::Receiver<DocChange<T>> {
        self.changes.subscribe()
    }

    fn notify(&self, change: DocChange<T>) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}
