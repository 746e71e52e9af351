use crate::document::{Document, IndexDeclaration};
use crossbeam_skiplist::SkipMap;
use std::collections::HashMap;
use std::sync::Mutex;

/// Observable events emitted by the persistence controller on its datastore.
///
/// `CompactionDone` is emitted once per successful compaction, after the
/// rename and the reopen have both finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A compaction finished successfully.
    CompactionDone,
}

/// The datastore collaborator the persistence core orchestrates over.
///
/// The query language, cursor iteration and index data structures live on
/// the other side of it. The core only ever needs to walk live documents,
/// read/replace the index-declaration view, and emit events back.
pub trait Collection: Send + Sync {
    /// Visits every live document, in whatever order the collection holds them.
    fn for_each(&self, visitor: &mut dyn FnMut(&Document));

    /// The current index declarations, keyed by field name. Excludes the
    /// implicit primary `_id` index, which is never written to the log.
    fn indexes(&self) -> HashMap<String, IndexDeclaration>;

    /// Replaces in-memory documents and index declarations with `data`, used
    /// after a fresh `load`. `None` means "reset to empty" (used to roll back
    /// after a failed load).
    fn reset(&self, data: Option<(Vec<Document>, HashMap<String, IndexDeclaration>)>);

    /// Notifies the datastore of an observable event.
    fn emit(&self, event: Event);
}

/// A concrete, usable `Collection`: a lock-free-read live document map plus a
/// mutex-guarded index-declaration map and event log.
///
/// Uses `crossbeam_skiplist::SkipMap` as a concurrently-readable index under
/// a single writer, so readers never block on the writer holding the
/// executor lock.
pub struct InMemoryCollection {
    live: SkipMap<String, Document>,
    indexes: Mutex<HashMap<String, IndexDeclaration>>,
    events: Mutex<Vec<Event>>,
}

impl InMemoryCollection {
    /// An empty collection.
    pub fn new() -> Self {
        InMemoryCollection {
            live: SkipMap::new(),
            indexes: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Inserts or overwrites a live document by `_id`.
    pub fn put(&self, doc: Document) {
        if let Some(id) = doc.id() {
            self.live.insert(id.to_owned(), doc);
        }
    }

    /// Removes a live document by `_id`.
    pub fn delete(&self, id: &str) {
        self.live.remove(id);
    }

    /// Looks up a live document by `_id`.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.live.get(id).map(|entry| entry.value().clone())
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True if there are no live documents.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Events recorded so far, oldest first. Intended for tests.
    pub fn recorded_events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for InMemoryCollection {
    fn default() -> Self {
        InMemoryCollection::new()
    }
}

impl Collection for InMemoryCollection {
    fn for_each(&self, visitor: &mut dyn FnMut(&Document)) {
        for entry in self.live.iter() {
            visitor(entry.value());
        }
    }

    fn indexes(&self) -> HashMap<String, IndexDeclaration> {
        self.indexes.lock().unwrap().clone()
    }

    fn reset(&self, data: Option<(Vec<Document>, HashMap<String, IndexDeclaration>)>) {
        // Clear by draining keys; `SkipMap` has no `clear`.
        for entry in self.live.iter() {
            self.live.remove(entry.key());
        }
        *self.indexes.lock().unwrap() = HashMap::new();

        if let Some((docs, indexes)) = data {
            for doc in docs {
                self.put(doc);
            }
            *self.indexes.lock().unwrap() = indexes;
        }
    }

    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
