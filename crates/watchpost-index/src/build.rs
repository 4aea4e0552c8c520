//! Full index rebuild from the markdown corpus

use crate::chunk::{chunk_text, Chunk};
use crate::embed::{normalize, Embedder};
use crate::error::IndexError;
use crate::store::KnowledgeIndex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub max_chars: usize,
    pub batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_chars: 500,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub embedder: String,
    pub index_path: PathBuf,
}

/// Every `*.md` file directly under `dir`, sorted by name
pub fn corpus_files(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Chunk and embed the corpus, then swap the result into `index_path`.
///
/// The database is written beside the target and renamed over it, so a
/// reader never opens a half-written index and a failed build leaves the
/// previous one in place.
pub fn build_index(
    source_dir: &Path,
    index_path: &Path,
    embedder: &dyn Embedder,
    options: BuildOptions,
) -> Result<BuildReport, IndexError> {
    let files = corpus_files(source_dir)?;
    if files.is_empty() {
        return Err(IndexError::EmptyCorpus(source_dir.to_path_buf()));
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => continue,
            Ok(content) => {
                let found = chunk_text(&content, &name, options.max_chars);
                debug!(file = %name, chunks = found.len(), "chunked");
                chunks.extend(found);
            }
            Err(err) => warn!(file = %name, error = %err, "skipping unreadable document"),
        }
    }
    if chunks.is_empty() {
        return Err(IndexError::EmptyCorpus(source_dir.to_path_buf()));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(options.batch_size.max(1)) {
        let mut embedded = embedder.embed(batch)?;
        if embedded.len() != batch.len() {
            return Err(IndexError::Embedding(format!(
                "{} vectors for a batch of {}",
                embedded.len(),
                batch.len()
            )));
        }
        embedded.iter_mut().for_each(|v| normalize(v));
        vectors.extend(embedded);
    }
    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    let index = KnowledgeIndex::new(embedder.name(), dimension, vectors, chunks)?;

    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path(index_path);
    if let Err(err) = index.save(&tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }
    std::fs::rename(&tmp_path, index_path)?;

    let meta = index.meta();
    info!(
        documents = meta.document_count,
        chunks = meta.chunk_count,
        dimension,
        embedder = embedder.name(),
        path = %index_path.display(),
        "index rebuilt"
    );
    Ok(BuildReport {
        documents: meta.document_count,
        chunks: meta.chunk_count,
        dimension,
        embedder: embedder.name().to_string(),
        index_path: index_path.to_path_buf(),
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}
