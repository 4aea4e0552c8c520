//! Cached, refreshable access to the knowledge index
//!
//! Queries take an `Arc` snapshot of {embedder, index} under the cache lock
//! and search without holding it. `refresh()` drops the cached snapshot and
//! embedder: in-flight queries finish against the snapshot they hold, and
//! the next caller reloads. A single loader runs at a time; concurrent callers
//! wait on the condition variable instead of loading again.

use crate::embed::{normalize, Embedder};
use crate::error::IndexError;
use crate::store::{IndexMeta, KnowledgeIndex};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use watchpost_core::RetrievedDocument;

/// Creates the embedder on first load
pub type EmbedderFactory = Box<dyn Fn() -> Result<Arc<dyn Embedder>, IndexError> + Send + Sync>;

/// An immutable {embedder, index} pair shared with in-flight queries
pub struct Snapshot {
    embedder: Arc<dyn Embedder>,
    index: KnowledgeIndex,
}

impl Snapshot {
    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    /// Embed `query` and return hits at or above `threshold`, best first
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedDocument>, IndexError> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let mut vector = self
            .embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("no vector returned for query".to_string()))?;
        normalize(&mut vector);

        let documents = self
            .index
            .search(&vector, top_k)?
            .into_iter()
            .filter_map(|(distance, position)| {
                let chunk = self.index.chunk(position)?;
                let similarity = (distance + 1.0) / 2.0;
                (similarity >= threshold)
                    .then(|| RetrievedDocument::new(chunk.text.trim(), &chunk.source, similarity))
            })
            .collect();
        Ok(documents)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub index_path: PathBuf,
    /// Whether a snapshot is currently cached
    pub cached: bool,
    /// Number of refreshes since start
    pub generation: u64,
    /// Summary of the index file on disk, if readable
    pub index: Option<IndexMeta>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<Snapshot>>,
    /// Survives refreshes; only the index is reloaded
    embedder: Option<Arc<dyn Embedder>>,
    loading: bool,
    generation: u64,
}

pub struct Retriever {
    index_path: PathBuf,
    query_instruction: String,
    factory: EmbedderFactory,
    state: Mutex<CacheState>,
    loaded: Condvar,
}

impl Retriever {
    pub fn new(
        index_path: impl Into<PathBuf>,
        query_instruction: impl Into<String>,
        factory: EmbedderFactory,
    ) -> Self {
        Self {
            index_path: index_path.into(),
            query_instruction: query_instruction.into(),
            factory,
            state: Mutex::new(CacheState::default()),
            loaded: Condvar::new(),
        }
    }

    /// Retriever over a fixed embedder instance
    pub fn with_embedder(
        index_path: impl Into<PathBuf>,
        query_instruction: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self::new(
            index_path,
            query_instruction,
            Box::new(move || -> Result<Arc<dyn Embedder>, IndexError> {
                Ok(Arc::clone(&embedder))
            }),
        )
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Documents similar to `text`, best first. Never fails: a missing or
    /// unreadable index yields no documents.
    pub fn query(&self, text: &str, top_k: usize, threshold: f32) -> Vec<RetrievedDocument> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        let query = format!("{}{}", self.query_instruction, text);
        match snapshot.search(&query, top_k, threshold) {
            Ok(documents) => {
                debug!(hits = documents.len(), "retrieval finished");
                documents
            }
            Err(err) => {
                warn!(error = %err, "retrieval failed");
                Vec::new()
            }
        }
    }

    /// The cached snapshot, loading it if needed
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        let mut state = self.lock();
        loop {
            if let Some(snapshot) = &state.snapshot {
                return Some(Arc::clone(snapshot));
            }
            if !state.loading {
                break;
            }
            state = self.loaded.wait(state).unwrap_or_else(|p| p.into_inner());
        }

        state.loading = true;
        let generation = state.generation;
        let embedder = state.embedder.clone();
        drop(state);

        let mut guard = LoadGuard {
            retriever: self,
            armed: true,
        };
        let result = self.load(embedder);
        guard.armed = false;

        let mut state = self.lock();
        state.loading = false;
        self.loaded.notify_all();
        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                // A refresh during the load makes this snapshot stale for
                // later callers; the current caller may still use it.
                if state.generation == generation {
                    state.embedder = Some(Arc::clone(&snapshot.embedder));
                    state.snapshot = Some(Arc::clone(&snapshot));
                }
                Some(snapshot)
            }
            Err(err) => {
                warn!(path = %self.index_path.display(), error = %err, "knowledge index unavailable");
                None
            }
        }
    }

    /// The embedder, created on first use and dropped by `refresh()`
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>, IndexError> {
        if let Some(embedder) = self.lock().embedder.clone() {
            return Ok(embedder);
        }
        let created = (self.factory)()?;
        let mut state = self.lock();
        Ok(Arc::clone(state.embedder.get_or_insert(created)))
    }

    /// Drop the cached index and embedder so the next query reloads both
    pub fn refresh(&self) {
        let mut state = self.lock();
        state.snapshot = None;
        state.embedder = None;
        state.generation += 1;
        info!(generation = state.generation, "retriever cache refreshed");
    }

    pub fn stats(&self) -> RetrieverStats {
        let (cached, generation) = {
            let state = self.lock();
            (state.snapshot.is_some(), state.generation)
        };
        RetrieverStats {
            index_path: self.index_path.clone(),
            cached,
            generation,
            index: KnowledgeIndex::read_meta(&self.index_path).ok(),
        }
    }

    fn load(&self, embedder: Option<Arc<dyn Embedder>>) -> Result<Snapshot, IndexError> {
        let index = KnowledgeIndex::load(&self.index_path)?;
        let embedder = match embedder {
            Some(embedder) => embedder,
            None => (self.factory)()?,
        };
        if !index.meta().embedder.is_empty() && index.meta().embedder != embedder.name() {
            warn!(
                index = %index.meta().embedder,
                embedder = embedder.name(),
                "index was built with a different embedder"
            );
        }
        info!(chunks = index.len(), "knowledge index loaded");
        Ok(Snapshot { embedder, index })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Clears the loading flag if a load unwinds
struct LoadGuard<'a> {
    retriever: &'a Retriever,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.retriever.lock();
            state.loading = false;
            self.retriever.loaded.notify_all();
        }
    }
}
