use std::collections::HashSet;
use std::sync::Arc;

use crate::feed::Entry;
use crate::storage::{CursorStore, StoreError};

/// What a fetch means relative to the feed's cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    /// No cursor yet: the fetch seeds it and nothing is announced.
    Seed,
    /// Entries not in the cursor, in fetch order. May be empty.
    New(Vec<Entry>),
}

/// Decides which fetched entries are new, and records them once handled.
///
/// `diff` is a pure read; `commit` is the only write and is called after
/// dispatch, so a crash in between re-announces rather than loses entries.
#[derive(Clone)]
pub struct Tracker {
    cursors: Arc<dyn CursorStore>,
    window: usize,
}

impl Tracker {
    pub fn new(cursors: Arc<dyn CursorStore>, window: usize) -> Self {
        Self { cursors, window }
    }

    /// Identifier equality alone decides "already seen"; publish dates are ignored.
    pub async fn diff(&self, url: &str, fetched: &[Entry]) -> Result<Diff, StoreError> {
        let Some(cursor) = self.cursors.load_cursor(url).await? else {
            return Ok(Diff::Seed);
        };

        let mut in_batch = HashSet::new();
        let new = fetched
            .iter()
            .filter(|e| !cursor.contains(&e.id) && in_batch.insert(e.id.as_str()))
            .cloned()
            .collect();
        Ok(Diff::New(new))
    }

    /// Fold `fetched` into the feed's cursor. Skips the write when nothing changed.
    pub async fn commit(&self, url: &str, fetched: &[Entry]) -> Result<(), StoreError> {
        let current = self.cursors.load_cursor(url).await?;
        let base = current.clone().unwrap_or_default();
        let next = base.advance(fetched, self.window);

        if current.as_ref() == Some(&next) {
            return Ok(());
        }
        self.cursors.save_cursor(url, &next).await
    }
}
