use crate::document::{Document, IndexDeclaration};
use crate::error::{PersistError, Result};
use crate::persistence::log_reader::RecordOutcome;
use std::collections::HashMap;

/// Default ratio of corrupt/total records above which [`fold`] fails.
pub const DEFAULT_CORRUPT_ALERT_THRESHOLD: f64 = 0.1;

/// The result of folding a record stream: last-writer-wins live documents,
/// the current index-declaration view, and the documents in first-seen
/// order. Callers should treat that order as incidental rather than a
/// guarantee, though it falls out naturally of iterating an ordered map
/// and makes fixtures deterministic.
pub struct FoldResult {
    /// Live documents keyed by `_id`, last-writer-wins.
    pub live: HashMap<String, Document>,
    /// `_id`s in the order their document first appeared in the stream.
    pub order: Vec<String>,
    /// Current index declarations keyed by field name.
    pub indexes: HashMap<String, IndexDeclaration>,
    /// Corrupt records encountered (reader-level decode failures plus
    /// fold-level unstructured records).
    pub corrupt: usize,
    /// Total records encountered.
    pub total: usize,
}

impl FoldResult {
    /// Live documents in first-seen order.
    pub fn live_in_order(&self) -> Vec<&Document> {
        self.order
            .iter()
            .filter_map(|id| self.live.get(id))
            .collect()
    }
}

/// Applies last-writer-wins reduction to a stream of already
/// reader-classified records.
///
/// `reader_total`/`reader_corrupt` are the [`LogReader`](crate::persistence::log_reader::LogReader)'s
/// own end-of-stream tallies; `fold` adds to `reader_corrupt` whenever a
/// `Parsed` document matches none of the recognised record shapes (plain
/// document, tombstone, index-created, index-removed), then checks the
/// combined ratio against `threshold`.
pub fn fold<I>(
    records: I,
    reader_total: usize,
    reader_corrupt: usize,
    threshold: f64,
) -> Result<FoldResult>
where
    I: IntoIterator<Item = RecordOutcome>,
{
    let mut live: HashMap<String, Document> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut indexes: HashMap<String, IndexDeclaration> = HashMap::new();
    let mut corrupt = reader_corrupt;

    for outcome in records {
        let doc = match outcome {
            RecordOutcome::Corrupt => continue,
            RecordOutcome::Parsed(doc) => doc,
        };

        if let Some(id) = doc.id() {
            if doc.is_tombstone() {
                live.remove(id);
            } else {
                if !live.contains_key(id) {
                    order.push(id.to_owned());
                }
                live.insert(id.to_owned(), doc);
            }
        } else if let Some(decl) = doc.index_created() {
            indexes.insert(decl.field_name.clone(), decl);
        } else if let Some(field_name) = doc.index_removed() {
            indexes.remove(field_name);
        } else {
            corrupt += 1;
        }
    }

    let total = reader_total;
    let ratio = if total == 0 {
        0.0
    } else {
        corrupt as f64 / total as f64
    };

    if ratio > threshold {
        return Err(PersistError::CorruptionThresholdExceeded {
            corrupt,
            total,
            threshold,
        });
    }

    Ok(FoldResult {
        live,
        order,
        indexes,
        corrupt,
        total,
    })
}
