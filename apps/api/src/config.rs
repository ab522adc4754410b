use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::generator::GenerationSettings;
use crate::generation::length::LengthPolicy;
use crate::generation::retrieval::RetrievalSettings;
use crate::ingest::chunker::ChunkSettings;
use crate::llm_client::gemini::DEFAULT_MODEL;
use crate::llm_client::RetryPolicy;

/// Which embedder backs the exemplar index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Local all-MiniLM-L6-v2, downloaded into `cache_dir` on first start.
    FastEmbed { cache_dir: PathBuf },
    /// Deterministic offline feature hashing. Tests and air-gapped runs only.
    Hashing,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    OpenAi {
        api_key: String,
        base_url: String,
        model: String,
    },
}

/// Application configuration loaded from environment variables.
/// Only the port and numeric tunables can fail to parse; everything else has a default.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub blueprint_path: PathBuf,
    /// Absent key is not a startup error; model-backed calls fail with a configuration error.
    pub gemini_api_key: Option<String>,
    pub generation_model: String,
    pub embedding: EmbeddingBackend,

    // Ingestion
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    // Retrieval
    pub broad_cap: usize,
    pub targeted_cap: usize,
    pub exemplar_char_budget: usize,

    // Analysis
    pub analysis_char_budget: usize,

    // Length policy
    pub total_char_target: usize,
    pub hard_char_upper_bound: usize,
    pub truncation_target: usize,

    // Model calls
    pub retry_max_attempts: u32,
    pub retry_backoff_min_secs: u64,
    pub retry_backoff_max_secs: u64,
    pub grammar_pass: bool,
    pub gate_regenerations: u32,
    pub prompt_template_path: Option<PathBuf>,

    // Quality gate
    pub quality_char_ceiling: usize,
    pub quality_char_floor: usize,

    pub cv_char_limit: usize,
    pub synthetic_pause_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let data_dir = PathBuf::from(env_or("DATA_DIR", "data"));
        let store_dir = optional_env("STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("exemplar_index"));
        let blueprint_path = optional_env("BLUEPRINT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("style_blueprint.json"));

        let embedding = embedding_backend(
            &env_or("EMBEDDING_BACKEND", DEFAULT_EMBEDDING_BACKEND),
            &data_dir,
        )?;

        let config = Config {
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
            data_dir,
            store_dir,
            blueprint_path,
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            generation_model: env_or("GENERATION_MODEL", DEFAULT_MODEL),
            embedding,
            chunk_size: parse_env("CHUNK_SIZE", 1000)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", 200)?,
            broad_cap: parse_env("BROAD_CAP", 50)?,
            targeted_cap: parse_env("TARGETED_CAP", 30)?,
            exemplar_char_budget: parse_env("EXEMPLAR_CHAR_BUDGET", 60_000)?,
            analysis_char_budget: parse_env("ANALYSIS_CHAR_BUDGET", 25_000)?,
            total_char_target: parse_env("TOTAL_CHAR_TARGET", 3900)?,
            hard_char_upper_bound: parse_env("HARD_CHAR_UPPER_BOUND", 4200)?,
            truncation_target: parse_env("TRUNCATION_TARGET", 3950)?,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 5)?,
            retry_backoff_min_secs: parse_env("RETRY_BACKOFF_MIN_SECS", 10)?,
            retry_backoff_max_secs: parse_env("RETRY_BACKOFF_MAX_SECS", 15)?,
            grammar_pass: parse_env("GRAMMAR_PASS", false)?,
            gate_regenerations: parse_env("GATE_REGENERATIONS", 1)?,
            prompt_template_path: optional_env("PROMPT_TEMPLATE_PATH").map(PathBuf::from),
            quality_char_ceiling: parse_env("QUALITY_CHAR_CEILING", 4000)?,
            quality_char_floor: parse_env("QUALITY_CHAR_FLOOR", 3000)?,
            cv_char_limit: parse_env("CV_CHAR_LIMIT", 2000)?,
            synthetic_pause_secs: parse_env("SYNTHETIC_PAUSE_SECS", 4)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "CHUNK_SIZE must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        anyhow::ensure!(
            self.truncation_target <= self.hard_char_upper_bound,
            "TRUNCATION_TARGET must not exceed HARD_CHAR_UPPER_BOUND"
        );
        anyhow::ensure!(
            self.quality_char_floor <= self.quality_char_ceiling,
            "QUALITY_CHAR_FLOOR must not exceed QUALITY_CHAR_CEILING"
        );
        anyhow::ensure!(
            self.retry_backoff_min_secs <= self.retry_backoff_max_secs,
            "RETRY_BACKOFF_MIN_SECS must not exceed RETRY_BACKOFF_MAX_SECS"
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            backoff_min: Duration::from_secs(self.retry_backoff_min_secs),
            backoff_max: Duration::from_secs(self.retry_backoff_max_secs),
        }
    }

    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            broad_cap: self.broad_cap,
            targeted_cap: self.targeted_cap,
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            total_char_target: self.total_char_target,
            length: LengthPolicy {
                hard_upper_bound: self.hard_char_upper_bound,
                truncation_target: self.truncation_target,
            },
            grammar_pass: self.grammar_pass,
        }
    }

    /// Defaults rooted at `data_dir`, with no credentials. Used by tests.
    #[cfg(test)]
    pub fn for_data_dir(data_dir: &std::path::Path) -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            data_dir: data_dir.to_path_buf(),
            store_dir: data_dir.join("exemplar_index"),
            blueprint_path: data_dir.join("style_blueprint.json"),
            gemini_api_key: None,
            generation_model: DEFAULT_MODEL.to_string(),
            // Tests never download a model.
            embedding: EmbeddingBackend::Hashing,
            chunk_size: 1000,
            chunk_overlap: 200,
            broad_cap: 50,
            targeted_cap: 30,
            exemplar_char_budget: 60_000,
            analysis_char_budget: 25_000,
            total_char_target: 3900,
            hard_char_upper_bound: 4200,
            truncation_target: 3950,
            retry_max_attempts: 5,
            retry_backoff_min_secs: 10,
            retry_backoff_max_secs: 15,
            grammar_pass: false,
            gate_regenerations: 1,
            prompt_template_path: None,
            quality_char_ceiling: 4000,
            quality_char_floor: 3000,
            cv_char_limit: 2000,
            synthetic_pause_secs: 4,
        }
    }
}

const DEFAULT_EMBEDDING_BACKEND: &str = "fastembed";

fn embedding_backend(name: &str, data_dir: &Path) -> Result<EmbeddingBackend> {
    match name.to_lowercase().as_str() {
        "fastembed" => Ok(EmbeddingBackend::FastEmbed {
            cache_dir: optional_env("EMBEDDING_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("models")),
        }),
        "hashing" => Ok(EmbeddingBackend::Hashing),
        "openai" => Ok(EmbeddingBackend::OpenAi {
            api_key: optional_env("EMBEDDING_API_KEY")
                .context("EMBEDDING_API_KEY is required when EMBEDDING_BACKEND=openai")?,
            base_url: env_or("EMBEDDING_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
        }),
        other => anyhow::bail!(
            "EMBEDDING_BACKEND must be 'fastembed', 'hashing' or 'openai', got '{other}'"
        ),
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}
