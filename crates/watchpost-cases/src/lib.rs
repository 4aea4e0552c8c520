//! Case persistence and background re-indexing

mod document;
mod error;
mod reindex;
mod store;

pub use document::render_case_document;
pub use error::CaseError;
pub use reindex::{index_rebuilder, RebuildFn, ReindexHandle, ReindexScheduler};
pub use store::{CaseStats, CaseStore, StoredCase};
