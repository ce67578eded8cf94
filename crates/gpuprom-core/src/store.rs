//! Holder of the currently published snapshot.
//!
//! The refresh task publishes whole snapshots; scrape handlers take a
//! reference to whichever snapshot is current and render it without
//! holding any lock. A reader therefore sees either the previous or the
//! next snapshot in full, never a mix of both.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::Snapshot;

#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current snapshot and returns the published reference.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// The latest published snapshot, `None` before the first publish.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
