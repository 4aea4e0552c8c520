//! Text embedders

use crate::error::IndexError;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};
use watchpost_core::{EmbedderKind, PipelineConfig};

/// Output width of [`HashingEmbedder`]
pub const HASHING_DIMENSION: usize = 384;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

/// Maps texts to vectors. Implementations return L2-normalised vectors of a
/// fixed dimension.
pub trait Embedder: Send + Sync {
    /// Stable identifier, recorded in the index so a mismatched embedder is
    /// detectable
    fn name(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;
}

/// Build the embedder named by the configuration
pub fn embedder_for(config: &PipelineConfig) -> Result<Arc<dyn Embedder>, IndexError> {
    match config.embedder {
        EmbedderKind::FastEmbed => Ok(Arc::new(FastEmbedder::new(&config.embedding_model)?)),
        EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(HASHING_DIMENSION))),
    }
}

/// ONNX sentence embeddings via fastembed
pub struct FastEmbedder {
    name: String,
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    pub fn new(model_name: &str) -> Result<Self, IndexError> {
        let model = match model_name {
            "bge-small-zh-v1.5" => EmbeddingModel::BGESmallZHV15,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            other => return Err(IndexError::UnknownModel(other.to_string())),
        };
        let model = TextEmbedding::try_new(TextInitOptions::new(model))
            .map_err(|e| IndexError::Embedding(e.to_string()))?;
        Ok(Self {
            name: model_name.to_string(),
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.model.lock().unwrap_or_else(|p| p.into_inner());
        let mut vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| IndexError::Embedding(e.to_string()))?;
        vectors.iter_mut().for_each(|v| normalize(v));
        Ok(vectors)
    }
}

/// Feature hashing over word and Han-character tokens.
///
/// Needs no model download, which makes it the embedder for offline hosts
/// and tests. Han text contributes single characters and adjacent pairs.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokens(text: &str) -> Vec<String> {
    let re = TOKEN_RE
        .get_or_init(|| Regex::new(r"(\p{Han})|([\p{L}\p{N}_&&[^\p{Han}]]+)").unwrap());
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    let mut previous_han: Option<(usize, &str)> = None;
    for caps in re.captures_iter(&lower) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let token = whole.as_str();
        if caps.get(1).is_some() {
            if let Some((end, prev)) = previous_han {
                if end == whole.start() {
                    out.push(format!("{}{}", prev, token));
                }
            }
            previous_han = Some((whole.end(), token));
        } else {
            previous_han = None;
        }
        out.push(token.to_string());
    }
    out
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Scale to unit length; zero vectors are left alone
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-8 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
