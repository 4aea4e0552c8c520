//! On-disk layout, JSONL feeds and atomic writes shared by the pipeline crates

mod io;
mod paths;
mod types;

pub use io::{append_jsonl, atomic_write, read_jsonl, read_jsonl_tail, write_json_atomic};
pub use paths::{Paths, HOME_ENV};
pub use types::{ModelStage, RawOutputRecord};
