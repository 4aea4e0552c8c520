//! KnowledgeIndex with SQLite persistence

use crate::chunk::Chunk;
use crate::embed::dot;
use crate::error::IndexError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// Summary stored alongside the vectors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub embedder: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub document_count: usize,
    pub built_at: Option<DateTime<Utc>>,
}

/// Immutable vectors plus the chunk each one was computed from, addressed
/// by position
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    meta: IndexMeta,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<Chunk>,
}

impl KnowledgeIndex {
    pub fn new(
        embedder: &str,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
    ) -> Result<Self, IndexError> {
        if vectors.len() != chunks.len() {
            return Err(IndexError::Corrupt(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        let mut sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();

        Ok(Self {
            meta: IndexMeta {
                embedder: embedder.to_string(),
                dimension,
                chunk_count: chunks.len(),
                document_count: sources.len(),
                built_at: Some(Utc::now()),
            },
            vectors,
            chunks,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// Top `k` by inner product, as `(distance, position)` in descending
    /// order
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>, IndexError> {
        if query.len() != self.meta.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dimension,
                actual: query.len(),
            });
        }
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| (dot(query, v), position))
            .filter(|(d, _)| !d.is_nan())
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Write the whole index to a fresh database at `path`
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let mut conn = Connection::open(path)?;
        init_db(&conn)?;

        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO chunks (position, source, title, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, (chunk, vector)) in self.chunks.iter().zip(&self.vectors).enumerate() {
                insert.execute(params![
                    position as i64,
                    &chunk.source,
                    &chunk.title,
                    &chunk.text,
                    encode_vector(vector),
                ])?;
            }

            let built_at = self.meta.built_at.map(|t| t.to_rfc3339()).unwrap_or_default();
            let mut meta = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            meta.execute(params!["embedder", &self.meta.embedder])?;
            meta.execute(params!["dimension", self.meta.dimension.to_string()])?;
            meta.execute(params!["chunk_count", self.meta.chunk_count.to_string()])?;
            meta.execute(params!["document_count", self.meta.document_count.to_string()])?;
            meta.execute(params!["built_at", built_at])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load and verify a saved index
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let conn = open_read_only(path)?;
        let meta = read_meta_from(&conn)?;

        let mut stmt =
            conn.prepare("SELECT source, title, text, embedding FROM chunks ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                Chunk {
                    source: row.get(0)?,
                    title: row.get(1)?,
                    text: row.get(2)?,
                },
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut chunks = Vec::new();
        let mut vectors = Vec::new();
        for row in rows {
            let (chunk, blob) = row?;
            let vector = decode_vector(&blob, meta.dimension)?;
            chunks.push(chunk);
            vectors.push(vector);
        }

        if chunks.len() != meta.chunk_count {
            return Err(IndexError::Corrupt(format!(
                "metadata lists {} chunks, found {}",
                meta.chunk_count,
                chunks.len()
            )));
        }

        Ok(Self {
            meta,
            vectors,
            chunks,
        })
    }

    /// Read only the summary of a saved index
    pub fn read_meta(path: &Path) -> Result<IndexMeta, IndexError> {
        let conn = open_read_only(path)?;
        read_meta_from(&conn)
    }
}

fn init_db(conn: &Connection) -> Result<(), IndexError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chunks (
            position INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_source ON chunks(source)", [])?;
    Ok(())
}

fn open_read_only(path: &Path) -> Result<Connection, IndexError> {
    if !path.exists() {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn read_meta_from(conn: &Connection) -> Result<IndexMeta, IndexError> {
    let get = |key: &str| -> Result<Option<String>, IndexError> {
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    };
    let number = |key: &str| -> Result<usize, IndexError> {
        get(key)?
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| IndexError::Corrupt(format!("missing or invalid `{}`", key)))
    };

    Ok(IndexMeta {
        embedder: get("embedder")?.unwrap_or_default(),
        dimension: number("dimension")?,
        chunk_count: number("chunk_count")?,
        document_count: number("document_count").unwrap_or(0),
        built_at: get("built_at")?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8], dimension: usize) -> Result<Vec<f32>, IndexError> {
    if blob.len() != dimension * 4 {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: blob.len() / 4,
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            title: "t".to_string(),
            text: text.to_string(),
        }
    }

    fn sample() -> KnowledgeIndex {
        KnowledgeIndex::new(
            "test",
            2,
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
            vec![
                chunk("rules.md", "east"),
                chunk("case_1.md", "north"),
                chunk("case_1.md", "west"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = sample();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(1.0, 0), (0.0, 1)]);
        assert_eq!(index.meta().document_count, 2);
    }

    #[test]
    fn test_search_rejects_wrong_dimension() {
        assert!(matches!(
            sample().search(&[1.0], 3),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_cardinality_enforced() {
        let result = KnowledgeIndex::new("test", 2, vec![vec![1.0, 0.0]], vec![]);
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_save_load_preserves_positions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.db");
        let index = sample();
        index.save(&path).unwrap();

        let loaded = KnowledgeIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.chunk(2).unwrap().text, "west");
        assert_eq!(loaded.search(&[0.0, 1.0], 1).unwrap(), vec![(1.0, 1)]);

        let meta = KnowledgeIndex::read_meta(&path).unwrap();
        assert_eq!(meta.embedder, "test");
        assert_eq!(meta.chunk_count, 3);
        assert!(meta.built_at.is_some());
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.db");
        assert!(KnowledgeIndex::load(&missing).is_err());

        let garbage = dir.path().join("garbage.db");
        std::fs::write(&garbage, b"not a database at all").unwrap();
        assert!(KnowledgeIndex::load(&garbage).is_err());

        let truncated = dir.path().join("truncated.db");
        sample().save(&truncated).unwrap();
        let conn = Connection::open(&truncated).unwrap();
        conn.execute("DELETE FROM chunks WHERE position = 2", []).unwrap();
        drop(conn);
        assert!(matches!(
            KnowledgeIndex::load(&truncated),
            Err(IndexError::Corrupt(_))
        ));
    }
}
