//! Staged recovery of malformed JSON returned by generative models.
//!
//! Recovery runs as an ordered list of independent passes, each mapping
//! `text -> (text, changed)`. After extraction and a direct parse attempt the
//! repair passes run in order, the result is re-parsed, and as a last resort a
//! lenient parser folds raw key/value occurrences so the last duplicate wins.
//! [`recover`] never fails: when nothing parses it returns a default
//! no-alarm structure.

mod arith;
mod lenient;
mod metadata;
mod passes;
mod recover;
mod scan;

pub use metadata::{default_metadata, default_structure, UNKNOWN_MODEL};
pub use passes::{
    evaluate_confidence, extract_json, normalize_punctuation, remove_trailing_commas,
    repair_broken_strings, Pass, REPAIR_PASSES,
};
pub use recover::{recover, recover_with, try_recover, try_recover_with, Recovery, Stage};
