use std::collections::HashMap;

use crate::error::Result;
use crate::store::{Collection, DocEntity};

/// Deltas between a table's load-time snapshot and its current state.
/// Upserts and removals are independently idempotent replays of the final
/// desired state, not a log of operations.
#[derive(Debug, Clone)]
pub struct TableDelta<T: DocEntity> {
    pub upserts: Vec<T>,
    pub removed: Vec<T::Id>,
}

impl<T: DocEntity> TableDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removed.is_empty()
    }
}

/// One in-memory table of the unit of work: the load-time snapshot plus the
/// working copy. All finds and mutations touch only the working copy.
#[derive(Debug, Clone)]
pub struct CacheTable<T: DocEntity> {
    original: HashMap<T::Id, T>,
    current: HashMap<T::Id, T>,
}

impl<T: DocEntity> Default for CacheTable<T> {
    fn default() -> Self {
        Self {
            original: HashMap::new(),
            current: HashMap::new(),
        }
    }
}

impl<T: DocEntity> CacheTable<T> {
    pub fn from_docs(docs: Vec<T>) -> Self {
        let map: HashMap<T::Id, T> = docs.into_iter().map(|d| (d.doc_id(), d)).collect();
        Self {
            original: map.clone(),
            current: map,
        }
    }

    pub fn find_one(&self, id: &T::Id) -> Option<&T> {
        self.current.get(id)
    }

    /// Matching documents, cloned out of the working copy
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.current
            .values()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.current.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Insert or replace a document in the working copy
    pub fn insert(&mut self, doc: T) {
        self.current.insert(doc.doc_id(), doc);
    }

    /// Mutate one document; returns whether it existed
    pub fn update(&mut self, id: &T::Id, mutate: impl FnOnce(&mut T)) -> bool {
        match self.current.get_mut(id) {
            Some(doc) => {
                mutate(doc);
                true
            }
            None => false,
        }
    }

    /// Mutate every matching document; returns how many matched
    pub fn update_where(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        mut mutate: impl FnMut(&mut T),
    ) -> usize {
        let mut count = 0;
        for doc in self.current.values_mut() {
            if predicate(doc) {
                mutate(doc);
                count += 1;
            }
        }
        count
    }

    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        self.current.remove(id)
    }

    pub fn remove_where(&mut self, predicate: impl Fn(&T) -> bool) -> Vec<T::Id> {
        let ids: Vec<T::Id> = self
            .current
            .values()
            .filter(|doc| predicate(doc))
            .map(DocEntity::doc_id)
            .collect();
        for id in &ids {
            self.current.remove(id);
        }
        ids
    }

    /// Diff the working copy against the load-time snapshot
    pub fn delta(&self) -> TableDelta<T> {
        let mut upserts = Vec::new();
        for (id, doc) in &self.current {
            match self.original.get(id) {
                Some(original) if original == doc => {}
                _ => upserts.push(doc.clone()),
            }
        }
        let removed: Vec<T::Id> = self
            .original
            .keys()
            .filter(|id| !self.current.contains_key(id))
            .cloned()
            .collect();
        TableDelta { upserts, removed }
    }

    /// Write this table's delta into the underlying collection
    pub async fn flush(&self, collection: &Collection<T>) -> Result<TableDelta<T>> {
        let delta = self.delta();
        for doc in &delta.upserts {
            collection.insert(doc.clone()).await?;
        }
        for id in &delta.removed {
            collection.remove(id).await?;
        }
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceId, DeviceType, PeripheralDevice, StudioId};

    fn device(id: &str) -> PeripheralDevice {
        PeripheralDevice {
            id: DeviceId::new(id),
            token: "secret".into(),
            studio_id: StudioId::new("studio0"),
            name: format!("gateway {id}"),
            device_type: DeviceType::Ingest,
            connected: true,
            last_seen: None,
        }
    }

    #[test]
    fn test_delta_tracks_insert_update_remove() {
        let mut table = CacheTable::from_docs(vec![device("a"), device("b"), device("c")]);

        table.insert(device("d"));
        table.update(&DeviceId::new("a"), |d| d.connected = false);
        table.remove(&DeviceId::new("b"));

        let delta = table.delta();
        let mut upserted: Vec<String> = delta.upserts.iter().map(|d| d.id.to_string()).collect();
        upserted.sort();
        assert_eq!(upserted, vec!["a", "d"]);
        assert_eq!(delta.removed, vec![DeviceId::new("b")]);
    }

    #[test]
    fn test_untouched_table_has_empty_delta() {
        let table = CacheTable::from_docs(vec![device("a"), device("b")]);
        assert!(table.delta().is_empty());
    }

    #[test]
    fn test_identical_rewrite_is_not_a_change() {
        let mut table = CacheTable::from_docs(vec![device("a")]);
        table.insert(device("a"));
        assert!(table.delta().is_empty());
    }

    #[tokio::test]
    async fn test_flush_applies_only_deltas() {
        let collection: Collection<PeripheralDevice> = Collection::new();
        collection.insert(device("a")).await.unwrap();
        collection.insert(device("b")).await.unwrap();

        let mut table =
            CacheTable::from_docs(collection.find(|_| true).await.unwrap());
        table.remove(&DeviceId::new("a"));
        table.insert(device("c"));

        let delta = table.flush(&collection).await.unwrap();
        assert_eq!(delta.upserts.len(), 1);
        assert_eq!(delta.removed.len(), 1);
        assert!(collection
            .find_one(&DeviceId::new("a"))
            .await
            .unwrap()
            .is_none());
        assert!(collection
            .find_one(&DeviceId::new("c"))
            .await
            .unwrap()
            .is_some());
    }
}
