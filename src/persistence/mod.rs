//! The persistence core: folding a log into live state, rewriting it by
//! compaction, and orchestrating both behind a single controller.

pub mod autocompaction;
pub mod compactor;
pub mod controller;
pub mod log_reader;
pub mod state_fold;

pub use controller::PersistenceController;
