use crate::codec::Codec;
use crate::error::{PersistError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type StringTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Validated configuration for a [`PersistenceController`](crate::persistence::controller::PersistenceController).
///
/// Bundles everything needed to open a log file: where it lives, how
/// records are encoded, the acceptable corruption ratio, and whether disk
/// I/O is used at all.
pub struct PersistOptions {
    pub(crate) filename: PathBuf,
    pub(crate) corrupt_alert_threshold: f64,
    pub(crate) codec: Codec,
    pub(crate) in_memory_only: bool,
}

/// Builds a [`PersistOptions`]. Enforces "both codec hooks or neither" at
/// `build()` time.
#[derive(Default)]
pub struct PersistOptionsBuilder {
    filename: Option<PathBuf>,
    corrupt_alert_threshold: Option<f64>,
    after_serialization: Option<StringTransform>,
    before_deserialization: Option<StringTransform>,
    in_memory_only: bool,
}

impl PersistOptionsBuilder {
    /// The log file path. Required unless `in_memory_only(true)`.
    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    /// Corruption ratio above which [`PersistenceController::load`](crate::persistence::controller::PersistenceController::load)
    /// fails. Default `0.1`.
    pub fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.corrupt_alert_threshold = Some(threshold);
        self
    }

    /// A hook applied to each record's JSON text after serialization, before
    /// it is written (e.g. compression, encryption).
    pub fn after_serialization<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.after_serialization = Some(Arc::new(f));
        self
    }

    /// The inverse hook, applied before JSON deserialization.
    pub fn before_deserialization<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.before_deserialization = Some(Arc::new(f));
        self
    }

    /// Disables all I/O; every operation becomes a no-op that succeeds.
    pub fn in_memory_only(mut self, yes: bool) -> Self {
        self.in_memory_only = yes;
        self
    }

    /// Validates and builds the options.
    ///
    /// Fails with `ConfigurationInconsistent` if `filename` ends in `~`
    /// (reserved for the compaction backup) or if exactly one of the codec
    /// hooks was supplied. Fails with `CodecNotInvertible` if a supplied
    /// pair does not round-trip over the verification sample.
    pub fn build(self) -> Result<PersistOptions> {
        let filename = match &self.filename {
            Some(path) => path.clone(),
            None if self.in_memory_only => PathBuf::new(),
            None => {
                return Err(PersistError::ConfigurationInconsistent(
                    "filename is required unless in_memory_only is set".to_owned(),
                ))
            }
        };

        if filename_ends_in_backup_suffix(&filename) {
            return Err(PersistError::ConfigurationInconsistent(format!(
                "filename {:?} must not end in '~' (reserved for the compaction backup)",
                filename
            )));
        }

        let codec = match (self.after_serialization, self.before_deserialization) {
            (None, None) => Codec::json(),
            (Some(encode), Some(decode)) => Codec::custom(
                move |s: &str| encode(s),
                move |s: &str| decode(s),
            )?,
            _ => {
                return Err(PersistError::ConfigurationInconsistent(
                    "after_serialization and before_deserialization must both be supplied, or neither".to_owned(),
                ))
            }
        };

        Ok(PersistOptions {
            filename,
            corrupt_alert_threshold: self.corrupt_alert_threshold.unwrap_or(crate::persistence::state_fold::DEFAULT_CORRUPT_ALERT_THRESHOLD),
            codec,
            in_memory_only: self.in_memory_only,
        })
    }
}

fn filename_ends_in_backup_suffix(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().ends_with('~')
}

impl PersistOptions {
    /// Starts a fresh builder.
    pub fn builder() -> PersistOptionsBuilder {
        PersistOptionsBuilder::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_filename_ending_in_tilde() {
        let result = PersistOptions::builder().filename("data.log~").build();
        assert!(matches!(
            result,
            Err(PersistError::ConfigurationInconsistent(_))
        ));
    }

    #[test]
    fn rejects_one_sided_codec() {
        let result = PersistOptions::builder()
            .filename("data.log")
            .after_serialization(|s| s.to_owned())
            .build();
        assert!(matches!(
            result,
            Err(PersistError::ConfigurationInconsistent(_))
        ));
    }

    #[test]
    fn accepts_both_sided_codec() {
        let result = PersistOptions::builder()
            .filename("data.log")
            .after_serialization(|s| s.to_owned())
            .before_deserialization(|s| s.to_owned())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn in_memory_only_does_not_require_filename() {
        let result = PersistOptions::builder().in_memory_only(true).build();
        assert!(result.is_ok());
    }
}
