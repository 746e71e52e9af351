#![deny(missing_docs)]
//! Persistence core for an embedded, single-file, schema-less document store.
//!
//! A single append-only log file backs a live in-memory view (the
//! [`Collection`] collaborator). Writes are serialised through an
//! [`Executor`](executor::Executor), compaction rewrites the log by atomic
//! rename, and a [`PersistenceController`] ties load/append/compact/close
//! into one lifecycle. Query evaluation, cursors, and index data
//! structures beyond declaration records live outside this crate.

mod codec;
mod collection;
mod document;
mod error;
mod executor;
mod options;
mod persistence;
mod storage;

pub use codec::Codec;
pub use collection::{Collection, Event, InMemoryCollection};
pub use document::{Document, IndexDeclaration};
pub use error::{PersistError, Result};
pub use options::{PersistOptions, PersistOptionsBuilder};
pub use persistence::PersistenceController;
