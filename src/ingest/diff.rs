use std::collections::HashMap;

use crate::store::DocEntity;

/// Per-collection result of diffing materialized documents against cached
/// state. Transient: produced by the reconciler, consumed by the apply step,
/// never persisted.
#[derive(Debug, Clone)]
pub struct PreparedChanges<T: DocEntity> {
    pub inserted: Vec<T>,
    pub changed: Vec<T>,
    pub removed: Vec<T::Id>,
    pub unchanged: Vec<T::Id>,
}

impl<T: DocEntity> Default for PreparedChanges<T> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            changed: Vec::new(),
            removed: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<T: DocEntity> PreparedChanges<T> {
    /// No inserts, changes, or removals (unchanged entries do not count)
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.inserted.len() + self.changed.len() + self.removed.len()
    }
}

/// Diff `incoming` against `existing`, keyed by document id.
///
/// A document present on both sides and equal lands in `unchanged`, so
/// reapplying an identical push yields an empty change set.
pub fn diff_documents<T: DocEntity>(existing: &[T], incoming: &[T]) -> PreparedChanges<T> {
    let existing_by_id: HashMap<T::Id, &T> =
        existing.iter().map(|doc| (doc.doc_id(), doc)).collect();
    let mut changes = PreparedChanges::default();

    let mut seen: Vec<T::Id> = Vec::with_capacity(incoming.len());
    for doc in incoming {
        let id = doc.doc_id();
        seen.push(id.clone());
        match existing_by_id.get(&id) {
            None => changes.inserted.push(doc.clone()),
            Some(old) if *old == doc => changes.unchanged.push(id),
            Some(_) => changes.changed.push(doc.clone()),
        }
    }

    for doc in existing {
        let id = doc.doc_id();
        if !seen.contains(&id) {
            changes.removed.push(id);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceId, DeviceType, PeripheralDevice, StudioId};

    fn device(id: &str, name: &str) -> PeripheralDevice {
        PeripheralDevice {
            id: DeviceId::new(id),
            token: "secret".into(),
            studio_id: StudioId::new("studio0"),
            name: name.into(),
            device_type: DeviceType::Ingest,
            connected: true,
            last_seen: None,
        }
    }

    #[test]
    fn test_diff_classifies_all_four_sets() {
        let existing = vec![device("a", "a"), device("b", "b"), device("c", "c")];
        let incoming = vec![device("a", "a"), device("b", "b2"), device("d", "d")];

        let changes = diff_documents(&existing, &incoming);
        assert_eq!(changes.inserted.len(), 1);
        assert_eq!(changes.inserted[0].id, DeviceId::new("d"));
        assert_eq!(changes.changed.len(), 1);
        assert_eq!(changes.changed[0].id, DeviceId::new("b"));
        assert_eq!(changes.removed, vec![DeviceId::new("c")]);
        assert_eq!(changes.unchanged, vec![DeviceId::new("a")]);
    }

    #[test]
    fn test_identical_sets_diff_empty() {
        let docs = vec![device("a", "a"), device("b", "b")];
        let changes = diff_documents(&docs, &docs.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.unchanged.len(), 2);
    }
}
