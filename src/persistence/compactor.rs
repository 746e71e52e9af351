use crate::codec::Codec;
use crate::collection::Collection;
use crate::document::Document;
use crate::error::{PersistError, Result};
use crate::storage;
use log::debug;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Rewrites the log to contain exactly one record per live document plus one
/// record per live non-primary index, committing by atomic rename.
///
/// Opens a fresh backup file, streams every still-live entry into it, then
/// commits by renaming over the original rather than bumping a generation
/// number, so a crash at any point before the rename leaves the original log
/// wholly intact.
///
/// Reopening the append descriptor and emitting `compaction.done` are left
/// to the caller: the open descriptor is a resource the persistence
/// controller's Open/Closed state machine owns, not this pure rewrite step.
pub fn rewrite_and_commit(log_path: &Path, collection: &dyn Collection, codec: &Codec) -> Result<()> {
    let backup = storage::backup_path(log_path);
    let current_size = std::fs::metadata(log_path).map(|m| m.len()).unwrap_or(0);

    let mut backup_file = storage::create_for_write(&backup)?;
    storage::preallocate_best_effort(&backup_file, storage::preallocation_size(current_size));

    let mut written = 0usize;
    let mut write_err: Option<io::Error> = None;
    collection.for_each(&mut |doc: &Document| {
        write_record(&mut backup_file, doc, codec, &mut written, &mut write_err);
    });

    for decl in collection.indexes().values() {
        write_record(
            &mut backup_file,
            &Document::index_created_record(decl),
            codec,
            &mut written,
            &mut write_err,
        );
    }

    if let Some(e) = write_err {
        return Err(PersistError::io("write", backup.clone(), e));
    }

    backup_file
        .flush()
        .map_err(|e| PersistError::io("flush", backup.clone(), e))?;
    storage::fsync(&backup_file)?;
    drop(backup_file);

    storage::crash_safe_rename(&backup, log_path)?;
    debug!(
        "compaction rewrote {} into {} records",
        log_path.display(),
        written
    );

    Ok(())
}

// `for_each`'s visitor closure can't itself return a `Result`, so the first
// write failure is stashed in `err` and checked by the caller once the walk
// finishes; every write after the first failure is skipped rather than
// attempted against a file already known to be in a bad state.
fn write_record(file: &mut File, doc: &Document, codec: &Codec, written: &mut usize, err: &mut Option<io::Error>) {
    if err.is_some() {
        return;
    }
    let mut line = codec.encode(doc);
    line.push('\n');
    match file.write_all(line.as_bytes()) {
        Ok(()) => *written += 1,
        Err(e) => *err = Some(e),
    }
}
