use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::OnceCell;
use tracing::info;

use crate::blueprint::BlueprintRepository;
use crate::config::{Config, EmbeddingBackend};
use crate::errors::AppError;
use crate::generation::prompts::PromptTemplate;
use crate::llm_client::gemini::GeminiProvider;
use crate::llm_client::LlmClient;
use crate::quality::{QualityGate, QualityThresholds};
use crate::store::embedding::{Embedder, FastEmbedder, HashingEmbedder, OpenAiEmbedder};
use crate::store::ExemplarStore;

/// Process-wide context built once at startup and shared by every request.
///
/// The exemplar store is opened lazily on first use so a fresh install with
/// no index directory starts cleanly and reports an empty corpus.
pub struct Context {
    pub config: Config,
    pub blueprints: BlueprintRepository,
    pub template: PromptTemplate,
    pub gate: QualityGate,
    embedder: Arc<dyn Embedder>,
    /// `None` when `GEMINI_API_KEY` is unset.
    llm: Option<LlmClient>,
    store: OnceCell<ExemplarStore>,
}

impl Context {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Option<LlmClient>,
        template: PromptTemplate,
    ) -> Self {
        let gate = QualityGate::new(QualityThresholds {
            char_ceiling: config.quality_char_ceiling,
            char_floor: config.quality_char_floor,
        });
        Self {
            blueprints: BlueprintRepository::new(config.blueprint_path.clone()),
            config,
            template,
            gate,
            embedder,
            llm,
            store: OnceCell::new(),
        }
    }

    /// Wires the embedder, provider and prompt template described by `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = match &config.embedding {
            EmbeddingBackend::FastEmbed { cache_dir } => Arc::new(
                FastEmbedder::new(cache_dir.clone()).with_context(|| {
                    format!(
                        "loading all-MiniLM-L6-v2 into {} \
                         (EMBEDDING_BACKEND=hashing runs without the model)",
                        cache_dir.display()
                    )
                })?,
            ),
            EmbeddingBackend::Hashing => {
                tracing::warn!("Hashing embedder active; retrieval matches words, not meaning");
                Arc::new(HashingEmbedder)
            }
            EmbeddingBackend::OpenAi {
                api_key,
                base_url,
                model,
            } => Arc::new(
                OpenAiEmbedder::new(api_key, base_url, model.clone())
                    .context("building embedding client")?,
            ),
        };
        info!("Embedding model: {}", embedder.model_id());

        let llm = match &config.gemini_api_key {
            Some(key) => {
                let provider = GeminiProvider::new(key.clone(), config.generation_model.clone())
                    .context("building Gemini client")?;
                info!("LLM client initialized (model: {})", config.generation_model);
                Some(LlmClient::new(Arc::new(provider), config.retry_policy()))
            }
            None => {
                tracing::warn!("GEMINI_API_KEY not set; analysis and generation are disabled");
                None
            }
        };

        let template = PromptTemplate::load(config.prompt_template_path.as_deref())?;
        Ok(Self::new(config, embedder, llm, template))
    }

    /// The exemplar store, opened on first call.
    pub async fn store(&self) -> Result<&ExemplarStore, AppError> {
        let store = self
            .store
            .get_or_try_init(|| ExemplarStore::open(&self.config.store_dir, self.embedder.clone()))
            .await?;
        Ok(store)
    }

    /// Number of indexed chunks; 0 when the index has never been created.
    pub async fn exemplar_count(&self) -> Result<usize, AppError> {
        if let Some(store) = self.store.get() {
            return Ok(store.count().await?);
        }
        if !ExemplarStore::exists_at(&self.config.store_dir) {
            return Ok(0);
        }
        Ok(self.store().await?.count().await?)
    }

    /// The LLM client, or a configuration error naming the missing credential.
    pub fn llm(&self) -> Result<&LlmClient, AppError> {
        self.llm.as_ref().ok_or_else(|| {
            AppError::Configuration(
                "GEMINI_API_KEY is not set; model-backed calls are unavailable".into(),
            )
        })
    }

    pub fn optional_llm(&self) -> Option<&LlmClient> {
        self.llm.as_ref()
    }

    pub async fn shutdown(&self) {
        if let Some(store) = self.store.get() {
            store.close().await;
            info!("Exemplar index closed");
        }
    }
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<Context>,
}

impl AppState {
    pub fn new(ctx: Context) -> Self {
        Self { ctx: Arc::new(ctx) }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::context_with;
    use super::*;

    #[tokio::test]
    async fn test_missing_index_counts_as_empty_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), None);
        assert_eq!(ctx.exemplar_count().await.unwrap(), 0);
        assert!(!ctx.config.store_dir.exists());
    }

    #[tokio::test]
    async fn test_store_is_opened_once() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), None);
        let a = ctx.store().await.unwrap() as *const ExemplarStore;
        let b = ctx.store().await.unwrap() as *const ExemplarStore;
        assert_eq!(a, b);
        ctx.shutdown().await;
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), None);
        assert!(matches!(ctx.llm(), Err(AppError::Configuration(_))));
    }
}
