use crate::codec::Codec;
use crate::document::Document;
use crate::error::{PersistError, Result};
use bytes::Bytes;
use std::fs;
use std::path::Path;

/// The outcome of decoding one newline-terminated record.
#[derive(Debug)]
pub enum RecordOutcome {
    /// Decoded into a well-formed document (tombstone, index declaration, or
    /// plain document — shape validation is the state folder's job, C3).
    Parsed(Document),
    /// Failed to decode, or was a trailing record with no terminating newline.
    Corrupt,
}

/// Streams a log file by newline-terminated records.
///
/// Reads the whole file into a buffer once, then walks it record by record
/// without a second file read. A missing file is an empty stream, never an
/// error -- a freshly created store has nothing to recover.
pub struct LogReader {
    data: Bytes,
    pos: usize,
    codec: Codec,
    total: usize,
    corrupt: usize,
}

impl LogReader {
    /// Opens and buffers `path`, ready to stream. Does not read the file
    /// contents eagerly beyond this initial load.
    pub fn stream(path: &Path, codec: Codec) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Bytes::new(),
            Err(e) => return Err(PersistError::io("read", path.to_path_buf(), e)),
        };
        Ok(LogReader {
            data,
            pos: 0,
            codec,
            total: 0,
            corrupt: 0,
        })
    }

    /// Total records seen so far (valid for this instant; final once exhausted).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Corrupt records seen so far (valid for this instant; final once exhausted).
    pub fn corrupt(&self) -> usize {
        self.corrupt
    }

    fn decode_line(&mut self, line: &[u8]) -> RecordOutcome {
        let text = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                self.corrupt += 1;
                return RecordOutcome::Corrupt;
            }
        };
        match self.codec.decode(text) {
            Ok(doc) => RecordOutcome::Parsed(doc),
            Err(_) => {
                self.corrupt += 1;
                RecordOutcome::Corrupt
            }
        }
    }
}

impl Iterator for LogReader {
    type Item = RecordOutcome;

    fn next(&mut self) -> Option<RecordOutcome> {
        if self.pos >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(newline_at) => {
                let line = &rest[..newline_at];
                self.pos += newline_at + 1;
                self.total += 1;
                Some(self.decode_line(line))
            }
            None => {
                // Trailing incomplete record: tolerated, counted as one corrupt item.
                self.pos = self.data.len();
                self.total += 1;
                self.corrupt += 1;
                Some(RecordOutcome::Corrupt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_empty_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.log");
        let mut reader = LogReader::stream(&path, Codec::json()).unwrap();
        assert!(reader.next().is_none());
        assert_eq!(reader.total(), 0);
        assert_eq!(reader.corrupt(), 0);
    }

    #[test]
    fn parses_well_formed_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        fs::write(&path, "{\"_id\":\"a\"}\n{\"_id\":\"b\"}\n").unwrap();

        let mut reader = LogReader::stream(&path, Codec::json()).unwrap();
        let outcomes: Vec<_> = (&mut reader).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], RecordOutcome::Parsed(_)));
        assert!(matches!(outcomes[1], RecordOutcome::Parsed(_)));
        assert_eq!(reader.total(), 2);
        assert_eq!(reader.corrupt(), 0);
    }

    #[test]
    fn counts_corrupt_lines_and_trailing_incomplete_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        // one well-formed record, one garbage line, one trailing incomplete record
        fs::write(&path, "{\"_id\":\"a\"}\nnot json\n{\"_id\":\"trail").unwrap();

        let mut reader = LogReader::stream(&path, Codec::json()).unwrap();
        let outcomes: Vec<_> = (&mut reader).collect();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], RecordOutcome::Parsed(_)));
        assert!(matches!(outcomes[1], RecordOutcome::Corrupt));
        assert!(matches!(outcomes[2], RecordOutcome::Corrupt));
        assert_eq!(reader.total(), 3);
        assert_eq!(reader.corrupt(), 2);
    }
}
