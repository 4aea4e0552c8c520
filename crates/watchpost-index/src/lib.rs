//! Embedding, chunking, SQLite-persisted vector index and the cached
//! knowledge retriever

mod build;
mod chunk;
mod embed;
mod error;
mod retriever;
mod store;

pub use build::{build_index, corpus_files, BuildOptions, BuildReport};
pub use chunk::{chunk_text, Chunk};
pub use embed::{embedder_for, Embedder, FastEmbedder, HashingEmbedder, HASHING_DIMENSION};
pub use error::IndexError;
pub use retriever::{EmbedderFactory, Retriever, RetrieverStats, Snapshot};
pub use store::{IndexMeta, KnowledgeIndex};
