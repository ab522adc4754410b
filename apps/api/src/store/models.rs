use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a chunk sits inside its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOffset {
    /// Character offset of the chunk's first character in the ingested text.
    pub start_index: usize,
    /// Position of the chunk among the document's chunks.
    pub chunk_index: usize,
}

/// A chunk ready to be embedded and indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub source_document: String,
    pub offset: ChunkOffset,
}

/// A stored exemplar chunk. Immutable once written; removed only by a full reset.
#[derive(Debug, Clone, Serialize)]
pub struct ExemplarChunk {
    pub id: Uuid,
    pub text: String,
    pub source_document: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub offset: ChunkOffset,
}

pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity; zero-length or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
