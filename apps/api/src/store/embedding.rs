//! Embedding backends for the exemplar index.
//!
//! `FastEmbedder` runs all-MiniLM-L6-v2 locally and is the default.
//! `OpenAiEmbedder` talks to any OpenAI-compatible `/embeddings` endpoint.
//! `HashingEmbedder` is a deterministic offline stand-in (signed feature hashing
//! over word unigrams and bigrams) for tests and air-gapped runs; it matches
//! surface vocabulary, not meaning.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Dimensionality of the offline hashing embedder (matches MiniLM-sized indexes).
pub const HASHING_DIMENSIONS: usize = 384;

pub const MINILM_MODEL_ID: &str = "fastembed:all-MiniLM-L6-v2";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding response malformed: {0}")]
    Malformed(String),

    #[error("local embedding model failed: {0}")]
    Local(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier written into the index; a store refuses to mix models.
    fn model_id(&self) -> String;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// all-MiniLM-L6-v2 (384 dims) through ONNX Runtime.
///
/// `TextEmbedding::embed` needs `&mut self`, so the model sits behind a
/// `Mutex` and every batch runs on the blocking pool.
#[derive(Clone)]
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    /// Loads the model, downloading it into `cache_dir` on first start.
    pub fn new(cache_dir: PathBuf) -> anyhow::Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_id(&self) -> String {
        MINILM_MODEL_ID.to_string()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbedError::Local("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EmbedError::Local(e.to_string()))
        })
        .await
        .map_err(|e| EmbedError::Local(format!("embedding task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; HASHING_DIMENSIONS];
        let tokens = tokenize(text);

        for token in &tokens {
            accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            accumulate(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> String {
        format!("hashing-v1-{HASHING_DIMENSIONS}")
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn accumulate(vector: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let bucket = (hash % vector.len() as u64) as usize;
    let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

/// 64-bit FNV-1a; stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Async embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: String) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            batch_size: 64,
            max_retries: 3,
        })
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
            };
            let resp = self.client.post(&self.endpoint).json(&request).send().await?;
            let status = resp.status();
            if status.is_success() {
                let mut parsed: EmbeddingResponse = resp.json().await?;
                parsed.data.sort_by_key(|entry| entry.index);
                if parsed.data.len() != inputs.len() {
                    return Err(EmbedError::Malformed(format!(
                        "{} embeddings for {} inputs",
                        parsed.data.len(),
                        inputs.len()
                    )));
                }
                return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
            }

            let body = resp.text().await.unwrap_or_default();
            if should_retry(status) && attempt + 1 < self.max_retries {
                attempt += 1;
                let delay = Duration::from_millis(500 * (1 << attempt));
                warn!("Embedding endpoint returned {status}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                continue;
            }
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
