use crate::codec::Codec;
use crate::collection::Collection;
use crate::document::Document;
use crate::error::{PersistError, Result};
use crate::executor::Executor;
use crate::options::PersistOptions;
use crate::persistence::autocompaction::AutocompactionHandle;
use crate::persistence::compactor;
use crate::persistence::log_reader::LogReader;
use crate::persistence::state_fold;
use crate::storage;
use log::{debug, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The log descriptor's lifecycle.
///
/// Scoped so that every path out of `Open` -- `close`, a failed reopen, a
/// successful reopen -- releases the previous descriptor before installing
/// (or declining to install) a new one; the controller never holds two
/// descriptors at once.
enum DescriptorState {
    Closed,
    Open(File),
}

/// Orchestrates open/load/append/compact/close for a single log file.
///
/// A writer guarded for serialised access (the [`Executor`]), a descriptor
/// owned by the controller, and a single owner of the log path for its
/// lifetime. This controller never looks inside documents beyond what it
/// needs to fold, rewrite and reload the log -- document storage and
/// indexing are the [`Collection`] collaborator's job.
pub struct PersistenceController {
    filename: PathBuf,
    corrupt_alert_threshold: f64,
    codec: Codec,
    in_memory_only: bool,
    collection: Arc<dyn Collection>,
    descriptor: Arc<Mutex<DescriptorState>>,
    written_count: Arc<AtomicU64>,
    executor: Arc<Executor>,
    autocompaction: Mutex<Option<AutocompactionHandle>>,
}

impl PersistenceController {
    /// Constructs a controller from validated options and its owner
    /// datastore. Performs no I/O; call [`PersistenceController::load`] to
    /// open and populate it.
    pub fn new(options: PersistOptions, collection: Arc<dyn Collection>) -> Self {
        PersistenceController {
            filename: options.filename,
            corrupt_alert_threshold: options.corrupt_alert_threshold,
            codec: options.codec,
            in_memory_only: options.in_memory_only,
            collection,
            descriptor: Arc::new(Mutex::new(DescriptorState::Closed)),
            written_count: Arc::new(AtomicU64::new(0)),
            executor: Arc::new(Executor::new()),
            autocompaction: Mutex::new(None),
        }
    }

    /// Opens the log, recovers from any half-finished compaction, folds the
    /// record stream into the datastore, rewrites the log once, and
    /// releases requests the executor buffered before this call completed.
    ///
    /// On failure, the datastore's in-memory index state is rolled back to
    /// empty and no descriptor is installed.
    pub fn load(&self) -> Result<()> {
        if self.in_memory_only {
            return self.executor.process_buffer();
        }

        if let Err(e) = self.load_from_disk() {
            self.collection.reset(None);
            return Err(e);
        }

        self.executor.process_buffer()
    }

    fn load_from_disk(&self) -> Result<()> {
        if let Some(parent) = self.filename.parent() {
            if !parent.as_os_str().is_empty() {
                storage::mkdir_p(parent)?;
            }
        }

        // The integrity pass must run before the log is opened for append:
        // opening with `create(true)` would otherwise conjure an empty log
        // into existence and mask an orphaned backup that should be
        // promoted instead.
        storage::ensure_datafile_integrity(&self.filename)?;

        let mut reader = LogReader::stream(&self.filename, self.codec.clone())?;
        let mut outcomes = Vec::new();
        while let Some(outcome) = reader.next() {
            outcomes.push(outcome);
        }
        let fold_result = state_fold::fold(
            outcomes,
            reader.total(),
            reader.corrupt(),
            self.corrupt_alert_threshold,
        )?;

        let live_docs: Vec<Document> = fold_result.live_in_order().into_iter().cloned().collect();
        self.collection.reset(Some((live_docs, fold_result.indexes)));

        let file = storage::open_append(&self.filename)?;
        *self.descriptor.lock().unwrap() = DescriptorState::Open(file);

        run_compaction(
            &self.descriptor,
            &self.collection,
            &self.codec,
            &self.filename,
            &self.written_count,
            true,
        )
    }

    /// Appends `docs` to the log. A no-op if `docs` is empty. The batch
    /// appears in full or the operation fails; partial batches are never
    /// surfaced as success.
    pub fn append(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        if self.in_memory_only {
            return Ok(());
        }

        let mut buf = String::new();
        for doc in docs {
            buf.push_str(&self.codec.encode(doc));
            buf.push('\n');
        }
        let bytes = buf.into_bytes();
        let count = docs.len() as u64;

        let descriptor = Arc::clone(&self.descriptor);
        let written_count = Arc::clone(&self.written_count);

        self.executor.push(Box::new(move || {
            let mut guard = descriptor.lock().unwrap();
            match &mut *guard {
                DescriptorState::Open(file) => {
                    storage::append_and_sync(file, &bytes)?;
                    written_count.fetch_add(count, Ordering::SeqCst);
                    Ok(())
                }
                DescriptorState::Closed => Err(PersistError::Closed),
            }
        }))
    }

    /// Enqueues a compaction on the executor; the result is available once
    /// the rename and reopen have finished.
    pub fn compact(&self) -> Result<()> {
        if self.in_memory_only {
            return Ok(());
        }

        let descriptor = Arc::clone(&self.descriptor);
        let collection = Arc::clone(&self.collection);
        let codec = self.codec.clone();
        let path = self.filename.clone();
        let written_count = Arc::clone(&self.written_count);

        self.executor.push(Box::new(move || {
            run_compaction(&descriptor, &collection, &codec, &path, &written_count, true)
        }))
    }

    /// Starts (replacing any prior) autocompaction timer: on each tick, a
    /// compaction is enqueued only if `written_count >= min_writes`, and the
    /// next tick is armed only once that compaction completes. `interval` is
    /// clamped to a 5-second minimum.
    pub fn set_autocompaction(&self, interval: Duration, min_writes: u64) {
        if self.in_memory_only {
            return;
        }

        let descriptor = Arc::clone(&self.descriptor);
        let collection = Arc::clone(&self.collection);
        let codec = self.codec.clone();
        let path = self.filename.clone();
        let written_count = Arc::clone(&self.written_count);
        let written_count_for_check = Arc::clone(&self.written_count);
        let executor = Arc::clone(&self.executor);

        let handle = AutocompactionHandle::start(interval, min_writes, written_count_for_check, move || {
            debug!("autocompaction tick: enqueuing compaction for {}", path.display());
            let descriptor = Arc::clone(&descriptor);
            let collection = Arc::clone(&collection);
            let codec = codec.clone();
            let path = path.clone();
            let written_count = Arc::clone(&written_count);

            // Routed through the executor, same as `compact()` and `close()`,
            // so the rename can never interleave with a concurrently
            // submitted append: both take the same serialising lock.
            let result = executor.push(Box::new(move || {
                run_compaction(&descriptor, &collection, &codec, &path, &written_count, true)
            }));
            if let Err(e) = result {
                warn!("autocompaction failed: {}", e);
            }
        });

        let mut slot = self.autocompaction.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        *slot = Some(handle);
    }

    /// Cancels the pending autocompaction tick, if any. Idempotent; never
    /// interrupts a compaction already running.
    pub fn stop_autocompaction(&self) {
        if let Some(handle) = self.autocompaction.lock().unwrap().take() {
            handle.stop();
        }
    }

    /// Runs a terminal compaction and closes the log descriptor on success.
    /// Does not delete the log.
    pub fn close(&self) -> Result<()> {
        self.stop_autocompaction();

        if self.in_memory_only {
            return Ok(());
        }

        let descriptor = Arc::clone(&self.descriptor);
        let collection = Arc::clone(&self.collection);
        let codec = self.codec.clone();
        let path = self.filename.clone();
        let written_count = Arc::clone(&self.written_count);

        self.executor.push(Box::new(move || {
            run_compaction(&descriptor, &collection, &codec, &path, &written_count, false)
        }))
    }

    /// The log file path this controller manages.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// True once [`PersistenceController::load`] has released the executor's
    /// pre-load buffer.
    pub fn is_loaded(&self) -> bool {
        self.executor.is_ready()
    }
}

/// Shared by `load`, `compact`, `set_autocompaction` and `close`: rewrite
/// and commit, then -- only after the commit succeeds -- swap the
/// descriptor and emit `compaction.done`, which belong to the controller's
/// Open/Closed state machine rather than to the pure rewrite step.
fn run_compaction(
    descriptor: &Arc<Mutex<DescriptorState>>,
    collection: &Arc<dyn Collection>,
    codec: &Codec,
    path: &Path,
    written_count: &Arc<AtomicU64>,
    reopen: bool,
) -> Result<()> {
    compactor::rewrite_and_commit(path, collection.as_ref(), codec)?;

    let mut guard = descriptor.lock().unwrap();
    *guard = if reopen {
        match storage::open_append(path) {
            Ok(file) => DescriptorState::Open(file),
            Err(e) => {
                // The rename already committed; there is simply no
                // descriptor to install. Surface the failure, but the
                // collection's view and the on-disk log are both the
                // correct post-compaction state.
                drop(guard);
                written_count.store(0, Ordering::SeqCst);
                return Err(e);
            }
        }
    } else {
        DescriptorState::Closed
    };
    drop(guard);

    written_count.store(0, Ordering::SeqCst);
    collection.emit(crate::collection::Event::CompactionDone);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Event, InMemoryCollection};
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(id: &str) -> Document {
        let mut fields = serde_json::Map::new();
        fields.insert("_id".to_owned(), json!(id));
        Document::new(fields)
    }

    fn controller(dir: &Path) -> (Arc<InMemoryCollection>, PersistenceController) {
        let collection = Arc::new(InMemoryCollection::new());
        let options = PersistOptions::builder()
            .filename(dir.join("data.log"))
            .build()
            .unwrap();
        let controller = PersistenceController::new(options, Arc::clone(&collection) as Arc<dyn Collection>);
        (collection, controller)
    }

    #[test]
    fn s1_fresh_load_yields_empty_log_and_empty_state() {
        let dir = tempdir().unwrap();
        let (collection, controller) = controller(dir.path());
        controller.load().unwrap();

        assert!(controller.filename().exists());
        assert_eq!(std::fs::read_to_string(controller.filename()).unwrap(), "");
        assert!(collection.is_empty());
    }

    #[test]
    fn append_then_reload_observes_the_write() {
        let dir = tempdir().unwrap();
        let (collection, controller) = controller(dir.path());
        controller.load().unwrap();
        controller.append(&[doc("a")]).unwrap();

        assert_eq!(collection.get("a"), None); // append doesn't mutate the live collection directly
        drop(controller);

        let (collection2, controller2) = controller(dir.path());
        controller2.load().unwrap();
        assert_eq!(collection2.get("a"), Some(doc("a")));
        let _ = collection;
    }

    #[test]
    fn append_is_noop_on_empty_batch() {
        let dir = tempdir().unwrap();
        let (_collection, controller) = controller(dir.path());
        controller.load().unwrap();
        controller.append(&[]).unwrap();
    }

    #[test]
    fn close_runs_terminal_compaction_and_does_not_delete_log() {
        let dir = tempdir().unwrap();
        let (collection, controller) = controller(dir.path());
        controller.load().unwrap();
        controller.append(&[doc("a")]).unwrap();
        collection.put(doc("a"));

        controller.close().unwrap();

        assert!(controller.filename().exists());
        assert!(collection.recorded_events().contains(&Event::CompactionDone));
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempdir().unwrap();
        let (_collection, controller) = controller(dir.path());
        controller.load().unwrap();
        controller.close().unwrap();

        let result = controller.append(&[doc("a")]);
        assert!(matches!(result, Err(PersistError::Closed)));
    }

    #[test]
    fn in_memory_only_is_a_total_noop() {
        let options = PersistOptions::builder().in_memory_only(true).build().unwrap();
        let collection = Arc::new(InMemoryCollection::new());
        let controller = PersistenceController::new(options, collection as Arc<dyn Collection>);

        controller.load().unwrap();
        controller.append(&[doc("a")]).unwrap();
        controller.compact().unwrap();
        controller.close().unwrap();
    }

    #[test]
    fn requests_submitted_before_load_are_buffered_then_run() {
        let dir = tempdir().unwrap();
        let (collection, controller) = controller(dir.path());

        // append() before load() -- must be buffered, not lost or errored.
        controller.append(&[doc("buffered")]).unwrap();
        assert!(!controller.is_loaded());

        controller.load().unwrap();
        assert!(controller.is_loaded());

        drop(controller);
        let (collection2, controller2) = controller(dir.path());
        controller2.load().unwrap();
        assert_eq!(collection2.get("buffered"), Some(doc("buffered")));
        let _ = collection;
    }
}
