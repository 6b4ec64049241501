//! Registry of the patches created during one test.
//!
//! Entries keep their insertion order so teardown can stop patches newest
//! first.

use crate::domain::metadata::{PatchId, PatchMetadata, PatchState};

/// Ordered collection of patch records.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    entries: Vec<(PatchId, PatchMetadata)>,
    next_id: u64,
}

impl PatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record and return its id.
    pub fn insert(&mut self, metadata: PatchMetadata) -> PatchId {
        let id = PatchId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, metadata));
        id
    }

    /// Get a record by id.
    pub fn get(&self, id: PatchId) -> Option<&PatchMetadata> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, metadata)| metadata)
    }

    /// Get a mutable record by id.
    pub fn get_mut(&mut self, id: PatchId) -> Option<&mut PatchMetadata> {
        self.entries
            .iter_mut()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, metadata)| metadata)
    }

    /// Find the most recent record with this name.
    pub fn find_by_name(&self, name: &str) -> Option<PatchId> {
        self.entries
            .iter()
            .rev()
            .find(|(_, metadata)| metadata.name.as_deref() == Some(name))
            .map(|(id, _)| *id)
    }

    /// Iterate over records in insertion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (PatchId, &PatchMetadata)> {
        self.entries.iter().map(|(id, metadata)| (*id, metadata))
    }

    /// Ids of records in `state`, in insertion order.
    pub fn ids_in_state(&self, state: PatchState) -> Vec<PatchId> {
        self.iter()
            .filter(|(_, metadata)| metadata.state == state)
            .map(|(id, _)| id)
            .collect()
    }

    /// Ids of the active records installed at `path`, oldest first.
    pub fn active_on(&self, path: &str) -> Vec<PatchId> {
        self.iter()
            .filter(|(_, metadata)| {
                metadata.state == PatchState::Active && metadata.path.as_str() == path
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every record. Ids are never reused.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
