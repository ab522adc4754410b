/// LLM Client — the single point of entry for all model calls in the Architect.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// All LLM interactions MUST go through `LlmClient`, which owns the retry policy.
///
/// Provider errors are classified exactly once, at the provider adapter boundary,
/// into `ProviderError::Transient` (rate limits) or `ProviderError::Fatal`.
/// The retry loop below only ever looks at that tag.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod gemini;
pub mod prompts;

/// Tokens that mark a provider failure as a retryable rate limit.
const TRANSIENT_MARKERS: &[&str] = &["429", "quota", "resource_exhausted"];

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Classifies free-text provider failures. The provider gives no structured
    /// error typing, so this is the only place that pattern-matches on message text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
            ProviderError::Transient(message)
        } else {
            ProviderError::Fatal(message)
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0}")]
    Provider(String),

    #[error("Rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One model call: system instructions, user content and the structured-output directive.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// When set, the provider is asked for `application/json` matching this schema.
    pub response_schema: Option<Value>,
    pub temperature: f32,
    pub thinking_budget: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            response_schema: None,
            temperature: 1.0,
            thinking_budget: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }
}

/// The provider adapter contract: prompt in, raw text out, classified failures.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Identifier recorded in blueprint metadata.
    fn model_id(&self) -> &str;

    async fn generate(&self, request: &LlmRequest) -> Result<String, ProviderError>;
}

/// Randomized fixed-window backoff applied to transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_min: Duration::from_secs(10),
            backoff_max: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    fn jittered_delay(&self) -> Duration {
        if self.backoff_max <= self.backoff_min {
            return self.backoff_min;
        }
        let secs = rand::thread_rng()
            .gen_range(self.backoff_min.as_secs_f64()..=self.backoff_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// The single LLM client used by all services.
/// Wraps a `GenerationProvider` with the retry policy and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Calls the provider, sleeping 10–15s and retrying on rate limits.
    /// Any fatal error propagates immediately.
    pub async fn call(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.provider.generate(request).await {
                Ok(text) => {
                    debug!(
                        "LLM call succeeded on attempt {attempt}: {} chars",
                        text.len()
                    );
                    return Ok(text);
                }
                Err(ProviderError::Fatal(message)) => return Err(LlmError::Provider(message)),
                Err(ProviderError::Transient(message)) => {
                    if attempt == max_attempts {
                        warn!("Rate limit persisted through {max_attempts} attempts: {message}");
                        break;
                    }
                    let delay = self.retry.jittered_delay();
                    warn!(
                        "Rate limit hit (attempt {attempt}/{max_attempts}), cooling down for {:.1}s",
                        delay.as_secs_f32()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(LlmError::RateLimitExhausted {
            attempts: max_attempts,
        })
    }

    /// Calls the LLM and parses the text response as a JSON value.
    pub async fn call_json_value(&self, request: &LlmRequest) -> Result<Value, LlmError> {
        let text = self.call(request).await?;
        parse_json_text(&text)
    }
}

/// Parses model output as JSON after unwrapping any markdown fences.
pub fn parse_json_text(text: &str) -> Result<Value, LlmError> {
    let text = strip_json_fences(text);
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(text).map_err(LlmError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Provider stub that replays a script of responses, then repeats a fallback.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: Option<String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Always answers with the same text.
        pub fn always(text: impl Into<String>) -> Self {
            let mut provider = Self::new(Vec::new());
            provider.fallback = Some(text.into());
            provider
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn model_id(&self) -> &str {
            "scripted-test-model"
        }

        async fn generate(&self, request: &LlmRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(ProviderError::Fatal("script exhausted".to_string())),
            }
        }
    }

    pub fn client_for(provider: Arc<ScriptedProvider>) -> LlmClient {
        LlmClient::new(provider, RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{client_for, ScriptedProvider};
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_classify_rate_limit_markers() {
        assert!(matches!(
            ProviderError::classify("HTTP 429 Too Many Requests"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::classify("Quota exceeded for metric"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::classify("status: RESOURCE_EXHAUSTED"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::classify("400 invalid argument"),
            ProviderError::Fatal(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Transient("429".to_string())),
            Err(ProviderError::Transient("quota".to_string())),
            Ok("{\"ok\": true}".to_string()),
        ]));
        let client = client_for(provider.clone());

        let value = client
            .call_json_value(&LlmRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted_after_five_attempts() {
        let script = (0..10)
            .map(|_| Err(ProviderError::Transient("429 RESOURCE_EXHAUSTED".to_string())))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(script));
        let client = client_for(provider.clone());

        let started = tokio::time::Instant::now();
        let err = client.call(&LlmRequest::new("hello")).await.unwrap_err();

        assert!(matches!(err, LlmError::RateLimitExhausted { attempts: 5 }));
        assert_eq!(provider.calls(), 5);
        // Four cool-downs of 10–15s each between five attempts.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(40), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(60), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Fatal(
            "400 bad request".to_string(),
        ))]));
        let client = client_for(provider.clone());

        let err = client.call(&LlmRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_parse_json_text_rejects_prose() {
        assert!(matches!(
            parse_json_text("Sure! Here is the JSON you asked for."),
            Err(LlmError::Parse(_))
        ));
        assert!(matches!(parse_json_text("```json\n```"), Err(LlmError::EmptyContent)));
    }
}
